use ams_core::names::SubscriptionName;
use std::fmt::{self, Display, Formatter};

use crate::errors::{DispatchError, Result};

/// Token identifying one delivery attempt of one message to one subscription.
///
/// Rendered as `projects/{project}/subscriptions/{subscription}:{offset}:{delivery}`.
/// `delivery` is a per-subscription attempt counter, so a redelivered message
/// carries a different ack id than its previous attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckId {
    project: String,
    subscription: String,
    offset: u64,
    delivery: u64,
}

impl AckId {
    pub fn new(subscription: &SubscriptionName, offset: u64, delivery: u64) -> Self {
        AckId {
            project: subscription.project().to_string(),
            subscription: subscription.name().to_string(),
            offset,
            delivery,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn delivery(&self) -> u64 {
        self.delivery
    }

    /// Parses an ack id presented to `subscription`. Ids minted for another
    /// project or subscription are rejected like malformed ones.
    pub fn parse_for(raw: &str, subscription: &SubscriptionName) -> Result<AckId> {
        let invalid = || DispatchError::InvalidAckId(raw.to_string());

        let tokens: Vec<&str> = raw.split('/').collect();
        if tokens.len() != 4
            || tokens[0] != "projects"
            || tokens[1] != subscription.project()
            || tokens[2] != "subscriptions"
        {
            return Err(invalid());
        }

        let sub_tokens: Vec<&str> = tokens[3].split(':').collect();
        if sub_tokens.len() != 3 || sub_tokens[0] != subscription.name() {
            return Err(invalid());
        }

        let offset = sub_tokens[1].parse::<u64>().map_err(|_| invalid())?;
        let delivery = sub_tokens[2].parse::<u64>().map_err(|_| invalid())?;

        Ok(AckId::new(subscription, offset, delivery))
    }
}

impl Display for AckId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/subscriptions/{}:{}:{}",
            self.project, self.subscription, self.offset, self.delivery
        )
    }
}
