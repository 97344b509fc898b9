use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one accepted unit of work (a queued or executing build).
///
/// Issued monotonically by the host queue and never reused, so the core can
/// key its permission table on it without holding on to queue entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u64);

impl WorkItemId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

name_newtype!(NodeName);
name_newtype!(JobName);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_ids_order_by_issue() {
        assert!(WorkItemId::from_raw(3) < WorkItemId::from_raw(10));
        assert_eq!(WorkItemId::from_raw(7).to_string(), "#7");
    }

    #[test]
    fn names_display_raw() {
        assert_eq!(JobName::from("folder/nightly-deploy").to_string(), "folder/nightly-deploy");
        assert_eq!(NodeName::new("agent-1").as_str(), "agent-1");
    }
}
