/*
Category Resolver

Maps the free text of a notification to a card presentation. The title and message
are joined, lower-cased and checked against an ordered keyword table; the first rule
with any matching keyword wins and no match yields the neutral card.

Every role has its own table because the same words mean different things on
different dashboards ("verification" is a request to review for an admin, a status
change for a volunteer). Inside a table, multi-word phrases come before the single
words they contain so that "verification rejected" is never caught by "rejected".

Resolution is pure and total: no I/O, no state, no panics.
*/

use crate::core::platform::container::category::{Category, Icon, Presentation};
use crate::core::platform::container::identity::Role;
use crate::core::platform::container::notification::NotificationRecord;

/// One entry of a keyword table
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub keywords: &'static [&'static str],
    pub presentation: Presentation,
}

impl Rule {
    const fn new(keywords: &'static [&'static str], presentation: Presentation) -> Self {
        Self { keywords, presentation }
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|keyword| text.contains(keyword))
    }
}

use Category as C;
use Icon as I;

const VERIFICATION_APPROVED: Rule = Rule::new(
    &["verification approved"],
    Presentation::new(C::VerificationApproved, I::ShieldCheck, "#dcfce7", "#16a34a"),
);
const VERIFICATION_REJECTED: Rule = Rule::new(
    &["verification rejected"],
    Presentation::new(C::VerificationRejected, I::ShieldAlert, "#fee2e2", "#dc2626"),
);
const VERIFICATION_SUBMITTED: Rule = Rule::new(
    &["verification submitted"],
    Presentation::new(C::VerificationSubmitted, I::Info, "#eff6ff", "#3b82f6"),
);

static CITIZEN_RULES: &[Rule] = &[
    Rule::new(&["policy violation"], Presentation::new(C::PolicyViolation, I::ShieldAlert, "#fee2e2", "#dc2626")),
    Rule::new(
        &["payment success", "received a donation"],
        Presentation::new(C::DonationReceived, I::Coins, "#fef9c3", "#eab308"),
    ),
    Rule::new(&["payment failed", "refunded"], Presentation::new(C::PaymentFailed, I::AlertCircle, "#fee2e2", "#ef4444")),
    Rule::new(&["donation initiated"], Presentation::new(C::PaymentPending, I::CreditCard, "#eff6ff", "#3b82f6")),
    Rule::new(&["profile updated"], Presentation::new(C::ProfileUpdated, I::User, "#eff6ff", "#3b82f6")),
    Rule::new(&["new problem available"], Presentation::new(C::ProblemAvailable, I::MapPin, "#eff6ff", "#2563eb")),
    Rule::new(&["approved"], Presentation::new(C::Approved, I::CheckCircle, "#dcfce7", "#16a34a")),
    Rule::new(&["rejected", "deleted", "removed"], Presentation::new(C::Rejected, I::XCircle, "#fee2e2", "#dc2626")),
    Rule::new(&["volunteer"], Presentation::new(C::VolunteerActivity, I::HandHeart, "#f3e8ff", "#9333ea")),
    Rule::new(&["ngo"], Presentation::new(C::NgoActivity, I::HandHeart, "#ffedd5", "#ea580c")),
    Rule::new(&["resolved"], Presentation::new(C::Resolved, I::CheckCircle, "#dbeafe", "#2563eb")),
    Rule::new(&["pending"], Presentation::new(C::PaymentPending, I::CreditCard, "#eff6ff", "#3b82f6")),
    Rule::new(&["liked"], Presentation::new(C::Liked, I::Heart, "#fce7f3", "#ec4899")),
    Rule::new(&["comment"], Presentation::new(C::Comment, I::MessageCircle, "#f3e8ff", "#8b5cf6")),
    Rule::new(&["shared"], Presentation::new(C::Shared, I::Share2, "#cffafe", "#06b6d4")),
    Rule::new(&["reported"], Presentation::new(C::Reported, I::Flag, "#ffedd5", "#f97316")),
    Rule::new(&["welcome", "restored"], Presentation::new(C::Welcome, I::User, "#dcfce7", "#22c55e")),
    Rule::new(&["suspended", "password"], Presentation::new(C::AccountSecurity, I::Lock, "#f3f4f6", "#6b7280")),
    Rule::new(&["warning"], Presentation::new(C::Warning, I::AlertTriangle, "#fef3c7", "#f59e0b")),
    Rule::new(&["maintenance"], Presentation::new(C::Maintenance, I::Wrench, "#f1f5f9", "#64748b")),
    Rule::new(&["announcement"], Presentation::new(C::Announcement, I::Megaphone, "#f3e8ff", "#a855f7")),
];

static VOLUNTEER_RULES: &[Rule] = &[
    VERIFICATION_APPROVED,
    VERIFICATION_REJECTED,
    VERIFICATION_SUBMITTED,
    Rule::new(&["level up", "congratulations"], Presentation::new(C::Achievement, I::Trophy, "#fffbeb", "#f59e0b")),
    Rule::new(&["new problem", "available"], Presentation::new(C::ProblemAvailable, I::MapPin, "#eff6ff", "#2563eb")),
    Rule::new(&["assigned"], Presentation::new(C::Assigned, I::Briefcase, "#f3e8ff", "#9333ea")),
    Rule::new(&["resolved"], Presentation::new(C::Resolved, I::CheckCircle, "#dcfce7", "#16a34a")),
    Rule::new(&["feedback"], Presentation::new(C::Feedback, I::MessageSquare, "#cffafe", "#0891b2")),
    Rule::new(&["withdrawn"], Presentation::new(C::Withdrawn, I::XCircle, "#f3f4f6", "#6b7280")),
    Rule::new(&["donation", "funding"], Presentation::new(C::Funding, I::Coins, "#fef9c3", "#eab308")),
    Rule::new(&["points"], Presentation::new(C::Points, I::Star, "#f3e8ff", "#8b5cf6")),
    Rule::new(&["leaderboard"], Presentation::new(C::Leaderboard, I::Trophy, "#fce7f3", "#ec4899")),
    Rule::new(&["warning"], Presentation::new(C::Warning, I::AlertTriangle, "#ffedd5", "#f97316")),
    Rule::new(&["suspended"], Presentation::new(C::Suspended, I::UserX, "#fee2e2", "#dc2626")),
];

static NGO_RULES: &[Rule] = &[
    VERIFICATION_APPROVED,
    VERIFICATION_REJECTED,
    VERIFICATION_SUBMITTED,
    Rule::new(&["problem resolved"], Presentation::new(C::Resolved, I::CheckCircle, "#dcfce7", "#16a34a")),
    Rule::new(&["project created"], Presentation::new(C::ProjectCreated, I::FolderPlus, "#eff6ff", "#2563eb")),
    Rule::new(&["project updated"], Presentation::new(C::ProjectUpdated, I::FolderCog, "#cffafe", "#0891b2")),
    Rule::new(&["donation failed"], Presentation::new(C::PaymentFailed, I::XCircle, "#fee2e2", "#ef4444")),
    Rule::new(&["member removed"], Presentation::new(C::MemberRemoved, I::UserMinus, "#f3f4f6", "#6b7280")),
    Rule::new(&["member joined"], Presentation::new(C::MemberJoined, I::Users, "#f3e8ff", "#9333ea")),
    Rule::new(&["assigned"], Presentation::new(C::Assigned, I::Briefcase, "#ffedd5", "#ea580c")),
    Rule::new(&["donation", "high-value"], Presentation::new(C::DonationReceived, I::Coins, "#fef9c3", "#eab308")),
    Rule::new(&["added"], Presentation::new(C::MemberJoined, I::Users, "#f3e8ff", "#9333ea")),
    Rule::new(&["warning"], Presentation::new(C::Warning, I::AlertTriangle, "#ffedd5", "#f97316")),
    Rule::new(&["suspended"], Presentation::new(C::Suspended, I::UserX, "#fee2e2", "#dc2626")),
];

static ADMIN_RULES: &[Rule] = &[
    Rule::new(&["registered"], Presentation::new(C::Registered, I::UserPlus, "#eff6ff", "#2563eb")),
    Rule::new(&["reported"], Presentation::new(C::Reported, I::ShieldAlert, "#fee2e2", "#dc2626")),
    Rule::new(&["verification"], Presentation::new(C::VerificationRequest, I::FileCheck, "#f3e8ff", "#9333ea")),
    Rule::new(&["payment", "transaction"], Presentation::new(C::DonationReceived, I::Coins, "#fef9c3", "#eab308")),
    Rule::new(&["error", "failure", "down"], Presentation::new(C::SystemFailure, I::ServerCrash, "#fee2e2", "#ef4444")),
    Rule::new(&["announcement"], Presentation::new(C::Announcement, I::Megaphone, "#fdf4ff", "#d946ef")),
];

/// Merged table for callers that have no role at hand
static GENERAL_RULES: &[Rule] = &[
    VERIFICATION_APPROVED,
    VERIFICATION_REJECTED,
    VERIFICATION_SUBMITTED,
    Rule::new(&["policy violation"], Presentation::new(C::PolicyViolation, I::ShieldAlert, "#fee2e2", "#dc2626")),
    Rule::new(
        &["payment success", "received a donation"],
        Presentation::new(C::DonationReceived, I::Coins, "#fef9c3", "#eab308"),
    ),
    Rule::new(
        &["payment failed", "donation failed", "refunded"],
        Presentation::new(C::PaymentFailed, I::AlertCircle, "#fee2e2", "#ef4444"),
    ),
    Rule::new(&["donation initiated"], Presentation::new(C::PaymentPending, I::CreditCard, "#eff6ff", "#3b82f6")),
    Rule::new(&["profile updated"], Presentation::new(C::ProfileUpdated, I::User, "#eff6ff", "#3b82f6")),
    Rule::new(&["new problem"], Presentation::new(C::ProblemAvailable, I::MapPin, "#eff6ff", "#2563eb")),
    Rule::new(&["project created"], Presentation::new(C::ProjectCreated, I::FolderPlus, "#eff6ff", "#2563eb")),
    Rule::new(&["project updated"], Presentation::new(C::ProjectUpdated, I::FolderCog, "#cffafe", "#0891b2")),
    Rule::new(&["member removed"], Presentation::new(C::MemberRemoved, I::UserMinus, "#f3f4f6", "#6b7280")),
    Rule::new(&["member joined"], Presentation::new(C::MemberJoined, I::Users, "#f3e8ff", "#9333ea")),
    Rule::new(&["level up", "congratulations"], Presentation::new(C::Achievement, I::Trophy, "#fffbeb", "#f59e0b")),
    Rule::new(&["approved"], Presentation::new(C::Approved, I::CheckCircle, "#dcfce7", "#16a34a")),
    Rule::new(&["rejected", "deleted", "removed"], Presentation::new(C::Rejected, I::XCircle, "#fee2e2", "#dc2626")),
    Rule::new(&["resolved"], Presentation::new(C::Resolved, I::CheckCircle, "#dbeafe", "#2563eb")),
    Rule::new(&["assigned"], Presentation::new(C::Assigned, I::Briefcase, "#f3e8ff", "#9333ea")),
    Rule::new(&["suspended"], Presentation::new(C::Suspended, I::UserX, "#fee2e2", "#dc2626")),
    Rule::new(&["warning"], Presentation::new(C::Warning, I::AlertTriangle, "#fef3c7", "#f59e0b")),
    Rule::new(&["maintenance"], Presentation::new(C::Maintenance, I::Wrench, "#f1f5f9", "#64748b")),
    Rule::new(&["announcement"], Presentation::new(C::Announcement, I::Megaphone, "#f3e8ff", "#a855f7")),
    Rule::new(&["donation", "funding", "payment"], Presentation::new(C::Funding, I::Coins, "#fef9c3", "#eab308")),
    Rule::new(&["reported"], Presentation::new(C::Reported, I::Flag, "#ffedd5", "#f97316")),
    Rule::new(&["feedback", "comment"], Presentation::new(C::Comment, I::MessageCircle, "#f3e8ff", "#8b5cf6")),
];

/// Keyword classifier over one ordered rule table
#[derive(Debug, Clone, Copy)]
pub struct CategoryResolver {
    rules: &'static [Rule],
}

impl CategoryResolver {
    pub fn for_role(role: Role) -> Self {
        let rules = match role {
            Role::Citizen => CITIZEN_RULES,
            Role::Volunteer => VOLUNTEER_RULES,
            Role::Ngo => NGO_RULES,
            Role::Admin => ADMIN_RULES,
        };
        Self { rules }
    }

    pub fn general() -> Self {
        Self { rules: GENERAL_RULES }
    }

    /// Resolve the presentation for a title/message pair
    pub fn resolve(&self, title: &str, message: &str) -> Presentation {
        let text = format!("{} {}", title, message).to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.presentation)
            .unwrap_or_else(Presentation::neutral)
    }

    pub fn resolve_record(&self, record: &NotificationRecord) -> Presentation {
        self.resolve(&record.title, &record.message)
    }

    pub fn rules(&self) -> &'static [Rule] {
        self.rules
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::general()
    }
}
