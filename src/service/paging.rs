//! Page and message-window arguments for listing and retrieval

use crate::db::{Conversation, Message};
use crate::error::{ChatError, ChatResult};
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_MESSAGE_LIMIT: usize = 100;
pub const MAX_MESSAGE_LIMIT: usize = 1000;

/// 1-based page of a conversation listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> ChatResult<Self> {
        let page = match page.map(usize::try_from) {
            None => 1,
            Some(Ok(n)) if n >= 1 => n,
            Some(_) => return Err(ChatError::Validation("page must be at least 1".to_string())),
        };
        let page_size = match page_size.map(usize::try_from) {
            None => DEFAULT_PAGE_SIZE,
            Some(Ok(n)) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
            Some(_) => {
                return Err(ChatError::Validation(format!(
                    "page_size must be between 1 and {MAX_PAGE_SIZE}"
                )))
            }
        };
        Ok(Self { page, page_size })
    }

    /// Slice `items` to this page. Page 1 of an empty listing is valid,
    /// any page past the last one is not.
    pub fn apply<T>(self, items: Vec<T>) -> ChatResult<(Vec<T>, Pagination)> {
        let total_count = items.len();
        let total_pages = total_count.div_ceil(self.page_size).max(1);
        if self.page > total_pages {
            return Err(ChatError::NotFound(format!(
                "page {} (last page is {total_pages})",
                self.page
            )));
        }
        let page = items
            .into_iter()
            .skip((self.page - 1) * self.page_size)
            .take(self.page_size)
            .collect();
        Ok((
            page,
            Pagination {
                current_page: self.page,
                page_size: self.page_size,
                total_pages,
                total_count,
            },
        ))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    pub pagination: Pagination,
}

/// Window over a conversation's messages in order_number order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageWindow {
    pub limit: usize,
    pub offset: usize,
}

impl MessageWindow {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> ChatResult<Self> {
        let limit = match limit.map(usize::try_from) {
            None => DEFAULT_MESSAGE_LIMIT,
            Some(Ok(n)) if n <= MAX_MESSAGE_LIMIT => n,
            Some(_) => {
                return Err(ChatError::Validation(format!(
                    "message_limit must be between 0 and {MAX_MESSAGE_LIMIT}"
                )))
            }
        };
        let offset = match offset {
            None => 0,
            Some(n) => usize::try_from(n).map_err(|_| {
                ChatError::Validation("message_offset must be at least 0".to_string())
            })?,
        };
        Ok(Self { limit, offset })
    }
}

impl Default for MessageWindow {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MESSAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessagePagination {
    pub offset: usize,
    pub limit: usize,
    pub total_count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    /// Absent when the caller asked for the conversation only
    pub messages: Option<(Vec<Message>, MessagePagination)>,
}
