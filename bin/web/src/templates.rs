//! Askama templates for the RealText web interface

use askama::Template;

/// Topic entry for the navigation bar
#[derive(Debug)]
pub struct TopicNav {
    pub id: u64,
    pub name: String,
}

/// Reply information for display under its parent message
#[derive(Debug)]
pub struct ReplyView {
    pub id: u64,
    pub author: String,
    pub content: String,
    pub posted_at: String,
    pub like_count: usize,
    pub liked_by_me: bool,
    pub can_delete: bool,
}

/// Top-level message information for the feed
#[derive(Debug)]
pub struct MessageView {
    pub id: u64,
    pub author: String,
    pub content: String,
    pub posted_at: String,
    pub topic_name: Option<String>,
    pub like_count: usize,
    pub liked_by_me: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    /// Whether the feed is currently showing this message's edit form.
    pub editing: bool,
    pub replies: Vec<ReplyView>,
}

/// Feed page template (also hosts the inline edit form)
#[derive(Template)]
#[template(path = "feed.html")]
pub struct FeedTemplate {
    pub current_topic_name: String,
    pub post_topic_id: Option<u64>,
    pub topics: Vec<TopicNav>,
    pub messages: Vec<MessageView>,
    pub logged_in: bool,
    pub username: String,
    pub is_admin: bool,
    pub editing_content: String,
    pub error: Option<String>,
    pub csrf_token: String,
}

/// Login page template
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub csrf_token: String,
}

/// Registration page template
#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub error: Option<String>,
    pub csrf_token: String,
}
