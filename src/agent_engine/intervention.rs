// Detects replies that ask a human to step in (login, payment, captcha).
// First matching rule decides the category and reason; it never drives control flow.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionCategory {
    Credential,
    Payment,
    Verification,
    Authorization,
    IdentityBinding,
    NeedsUserInput,
}

impl InterventionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Payment => "payment",
            Self::Verification => "verification",
            Self::Authorization => "authorization",
            Self::IdentityBinding => "identity_binding",
            Self::NeedsUserInput => "needs_user_input",
        }
    }

    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Credential => "Please log in (enter the account name and password) on screen, then continue.",
            Self::Payment => "Please review and complete the payment or order step yourself, then continue.",
            Self::Verification => "Please solve the verification (captcha, SMS or slider check), then continue.",
            Self::Authorization => "Please grant or decline the requested permission, then continue.",
            Self::IdentityBinding => "Please complete the identity or account binding step, then continue.",
            Self::NeedsUserInput => "The agent is waiting for you. Check the screen, do what is asked, then continue.",
        }
    }
}

impl fmt::Display for InterventionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervention {
    pub category: InterventionCategory,
    /// Matched keyword, or a generic phrase for the fallback rule.
    pub reason: String,
}

impl Intervention {
    pub fn guidance(&self) -> &'static str {
        self.category.guidance()
    }
}

type Predicate = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct InterventionRule {
    category: InterventionCategory,
    predicate: Predicate,
}

impl InterventionRule {
    /// The predicate receives the lower-cased reply and returns the reason on a hit.
    pub fn new(category: InterventionCategory, predicate: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            category,
            predicate: Box::new(predicate),
        }
    }

    /// Fires on the first keyword (in list order) contained in the reply.
    pub fn keywords(category: InterventionCategory, keywords: &[&str]) -> Self {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        Self::new(category, move |text| {
            keywords.iter().find(|k| text.contains(k.as_str())).cloned()
        })
    }

    /// Fires on any keyword but reports a fixed reason.
    pub fn phrases(category: InterventionCategory, phrases: &[&str], reason: &str) -> Self {
        let phrases: Vec<String> = phrases.iter().map(|k| k.to_lowercase()).collect();
        let reason = reason.to_string();
        Self::new(category, move |text| {
            phrases
                .iter()
                .any(|p| text.contains(p.as_str()))
                .then(|| reason.clone())
        })
    }
}

pub const GENERIC_REASON: &str = "user action required";

const CREDENTIAL: &[&str] = &[
    "登录", "login", "log in", "sign in", "登陆", "登录验证", "双因子验证", "2fa",
    "账号", "密码", "用户名", "password", "account",
];
const PAYMENT: &[&str] = &[
    "购买", "支付", "payment", "pay now", "purchase", "付款", "结算", "确认支付", "支付方式",
    "订单", "下单", "立即购买", "立即支付", "购物车", "checkout",
];
const VERIFICATION: &[&str] = &[
    "验证码", "captcha", "verification code", "验证", "安全验证", "security check",
    "拖动验证", "滑块验证", "短信验证", "邮箱验证", "人机验证",
];
const AUTHORIZATION: &[&str] = &["授权", "permission", "权限", "同意", "accept", "确认授权", "consent"];
const IDENTITY_BINDING: &[&str] = &[
    "实名认证", "身份验证", "银行卡", "身份证", "实名", "手机验证", "绑定手机", "绑定邮箱", "identity",
];
const NEEDS_USER_INPUT: &[&str] = &[
    "需要用户", "请用户", "用户帮忙", "用户操作", "请输入", "请选择", "等待", "请稍候",
    "please input", "please enter", "please select", "please wait", "user action",
];

pub struct InterventionClassifier {
    rules: Vec<InterventionRule>,
}

impl InterventionClassifier {
    pub fn new(rules: Vec<InterventionRule>) -> Self {
        Self { rules }
    }

    /// Specific categories first, then the generic "needs user input" fallback.
    pub fn builtin() -> Self {
        use InterventionCategory::*;
        Self::new(vec![
            InterventionRule::keywords(Credential, CREDENTIAL),
            InterventionRule::keywords(Payment, PAYMENT),
            InterventionRule::keywords(Verification, VERIFICATION),
            InterventionRule::keywords(Authorization, AUTHORIZATION),
            InterventionRule::keywords(IdentityBinding, IDENTITY_BINDING),
            InterventionRule::phrases(NeedsUserInput, NEEDS_USER_INPUT, GENERIC_REASON),
        ])
    }

    /// Adds a rule after the existing ones.
    pub fn push(&mut self, rule: InterventionRule) {
        self.rules.push(rule);
    }

    pub fn classify(&self, text: &str) -> Option<Intervention> {
        let lower = text.to_lowercase();
        self.rules.iter().find_map(|rule| {
            (rule.predicate)(&lower).map(|reason| Intervention {
                category: rule.category,
                reason,
            })
        })
    }
}

impl Default for InterventionClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captcha_text_reports_the_keyword() {
        let hit = InterventionClassifier::builtin().classify("页面提示：请输入验证码").unwrap();
        assert_eq!(hit.category, InterventionCategory::Verification);
        assert_eq!(hit.reason, "验证码");
    }

    #[test]
    fn specific_categories_win_over_generic() {
        let hit = InterventionClassifier::builtin()
            .classify("Please enter your password to continue")
            .unwrap();
        assert_eq!(hit.category, InterventionCategory::Credential);
        assert_eq!(hit.reason, "password");
    }

    #[test]
    fn generic_fallback() {
        let hit = InterventionClassifier::builtin()
            .classify("The page is loading, please wait a moment.")
            .unwrap();
        assert_eq!(hit.category, InterventionCategory::NeedsUserInput);
        assert_eq!(hit.reason, GENERIC_REASON);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let hit = InterventionClassifier::builtin().classify("Solve the CAPTCHA").unwrap();
        assert_eq!(hit.reason, "captcha");
    }

    #[test]
    fn neutral_text_does_not_trigger() {
        assert!(InterventionClassifier::builtin()
            .classify("The search results are shown; the task is finished.")
            .is_none());
    }

    #[test]
    fn custom_rules_extend_the_classifier() {
        let mut classifier = InterventionClassifier::new(Vec::new());
        classifier.push(InterventionRule::new(InterventionCategory::Authorization, |t| {
            t.contains("admin rights").then(|| "admin rights".to_string())
        }));
        let hit = classifier.classify("This needs Admin Rights").unwrap();
        assert_eq!(hit.category, InterventionCategory::Authorization);
    }
}
