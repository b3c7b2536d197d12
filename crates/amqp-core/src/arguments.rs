use crate::{Content, Value};

/// Decoded arguments of one inbound method.
///
/// `content` is present only when the method's schema declares content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub values: Vec<Value>,
    pub content: Option<Content>,
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            content: None,
        }
    }

    pub fn with_content(values: Vec<Value>, content: Content) -> Self {
        Self {
            values,
            content: Some(content),
        }
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn into_first(self) -> Option<Value> {
        self.values.into_iter().next()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.content.is_none()
    }
}
