use std::fmt::{self, Display, Formatter};

/// Checks a project, topic or subscription name against `^[a-zA-Z0-9_-]+$`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Project scoped topic name, displayed as `/projects/{project}/topics/{topic}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName {
    project: String,
    name: String,
}

impl TopicName {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        TopicName {
            project: project.into(),
            name: name.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self) -> bool {
        is_valid_name(&self.project) && is_valid_name(&self.name)
    }
}

impl Display for TopicName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/projects/{}/topics/{}", self.project, self.name)
    }
}

/// Project scoped subscription name, displayed as
/// `/projects/{project}/subscriptions/{subscription}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionName {
    project: String,
    name: String,
}

impl SubscriptionName {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        SubscriptionName {
            project: project.into(),
            name: name.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_valid(&self) -> bool {
        is_valid_name(&self.project) && is_valid_name(&self.name)
    }
}

impl Display for SubscriptionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/projects/{}/subscriptions/{}", self.project, self.name)
    }
}
