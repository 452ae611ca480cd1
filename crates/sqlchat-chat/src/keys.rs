//! Persisted state keys. Each value is a JSON string owned by one component.

pub const CHATS: &str = "sqlchat.chatui.chats.v1";
pub const RECENTS: &str = "sqlchat.chatui.recents.v1";
pub const SCOPE: &str = "sqlchat.chatui.scope.v1";
pub const METRIC_RULES: &str = "sqlchat.chatui.metric_rules.v1";
pub const REGION: &str = "sqlchat.chatui.region.v1";
pub const CURRENCY: &str = "sqlchat.chatui.currency.v1";
pub const STAGE_BUCKET: &str = "sqlchat.chatui.stage_bucket.v1";
pub const DEMO_IDX: &str = "sqlchat.chatui.demo_idx.v1";
