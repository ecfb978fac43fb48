/*
Category Container

Presentation categories for notification cards. A category is the semantic kind
of a notification (approval, donation, warning, ...) and is rendered with an icon
and a background/border colour pair. Categories are produced by the Category
Resolver from the free text of a notification and carry no data of their own.
*/

use serde::Serialize;

/// Semantic kind of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Approved,
    Rejected,
    Resolved,
    VolunteerActivity,
    NgoActivity,
    ProblemAvailable,
    Assigned,
    Feedback,
    Withdrawn,
    DonationReceived,
    PaymentPending,
    PaymentFailed,
    Funding,
    Liked,
    Comment,
    Shared,
    Reported,
    Welcome,
    AccountSecurity,
    ProfileUpdated,
    Registered,
    Suspended,
    Warning,
    PolicyViolation,
    Maintenance,
    Announcement,
    SystemFailure,
    ProjectCreated,
    ProjectUpdated,
    MemberJoined,
    MemberRemoved,
    VerificationApproved,
    VerificationRejected,
    VerificationSubmitted,
    VerificationRequest,
    Achievement,
    Points,
    Leaderboard,
    /// No keyword matched
    Neutral,
}

/// Icon shown on a notification card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Icon {
    AlertCircle,
    AlertTriangle,
    Briefcase,
    CheckCircle,
    Coins,
    CreditCard,
    FileCheck,
    Flag,
    FolderCog,
    FolderPlus,
    HandHeart,
    Heart,
    Info,
    Lock,
    MapPin,
    Megaphone,
    MessageCircle,
    MessageSquare,
    ServerCrash,
    Share2,
    ShieldAlert,
    ShieldCheck,
    Star,
    Trophy,
    User,
    UserMinus,
    UserPlus,
    Users,
    UserX,
    Wrench,
    XCircle,
}

impl Icon {
    pub fn name(&self) -> &'static str {
        match self {
            Icon::AlertCircle => "alert-circle",
            Icon::AlertTriangle => "alert-triangle",
            Icon::Briefcase => "briefcase",
            Icon::CheckCircle => "check-circle",
            Icon::Coins => "coins",
            Icon::CreditCard => "credit-card",
            Icon::FileCheck => "file-check",
            Icon::Flag => "flag",
            Icon::FolderCog => "folder-cog",
            Icon::FolderPlus => "folder-plus",
            Icon::HandHeart => "hand-heart",
            Icon::Heart => "heart",
            Icon::Info => "info",
            Icon::Lock => "lock",
            Icon::MapPin => "map-pin",
            Icon::Megaphone => "megaphone",
            Icon::MessageCircle => "message-circle",
            Icon::MessageSquare => "message-square",
            Icon::ServerCrash => "server-crash",
            Icon::Share2 => "share-2",
            Icon::ShieldAlert => "shield-alert",
            Icon::ShieldCheck => "shield-check",
            Icon::Star => "star",
            Icon::Trophy => "trophy",
            Icon::User => "user",
            Icon::UserMinus => "user-minus",
            Icon::UserPlus => "user-plus",
            Icon::Users => "users",
            Icon::UserX => "user-x",
            Icon::Wrench => "wrench",
            Icon::XCircle => "x-circle",
        }
    }
}

/// Card colours as CSS hex strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Style {
    pub background: &'static str,
    pub border: &'static str,
}

/// Everything needed to render a card for one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Presentation {
    pub category: Category,
    pub icon: Icon,
    pub style: Style,
}

impl Presentation {
    pub const fn new(category: Category, icon: Icon, background: &'static str, border: &'static str) -> Self {
        Self {
            category,
            icon,
            style: Style { background, border },
        }
    }

    /// Grey info card used when nothing matches
    pub const fn neutral() -> Self {
        Self::new(Category::Neutral, Icon::Info, "#f3f4f6", "#9ca3af")
    }

    pub fn is_neutral(&self) -> bool {
        self.category == Category::Neutral
    }
}

impl Default for Presentation {
    fn default() -> Self {
        Self::neutral()
    }
}
