//! Owner labels for captured calls
//!
//! A call is attributed to the type that actually executed it rather than the
//! type whose body was run, so inherited methods show up under the concrete
//! subtype as `"Receiver < Definer"`.

use serde::{Deserialize, Serialize};

/// Label used when the call site carries no usable type name
pub const UNKNOWN_OWNER: &str = "(unknown)";

/// Call-site metadata supplied by the instrumentation source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteInfo {
    /// Type that defines the invoked method
    #[serde(default)]
    pub defining_type: String,
    /// Runtime type of the receiver, absent for anonymous receivers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_type: Option<String>,
    /// True when the receiver is itself a type or module object
    #[serde(default)]
    pub receiver_is_type: bool,
    /// The receiver's own name when it is a type or module object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
}

impl CallSiteInfo {
    /// Call on an instance of `type_name`
    pub fn instance(type_name: &str) -> Self {
        Self {
            defining_type: type_name.to_string(),
            receiver_type: Some(type_name.to_string()),
            ..Self::default()
        }
    }

    /// Owner label for this call site
    pub fn owner_label(&self) -> String {
        resolve(
            &self.defining_type,
            self.receiver_type.as_deref(),
            self.receiver_is_type,
            self.receiver_name.as_deref(),
        )
    }
}

/// Derive the owner label of a call. First match wins:
///
/// 1. no receiver type: the defining type
/// 2. receiver type equals the defining type: the defining type
/// 3. receiver is a type object: its own name
/// 4. otherwise: `"{receiver} < {definer}"`
pub fn resolve(
    defining_type: &str,
    receiver_type: Option<&str>,
    receiver_is_type: bool,
    receiver_name: Option<&str>,
) -> String {
    let definer = if defining_type.is_empty() {
        UNKNOWN_OWNER
    } else {
        defining_type
    };

    let receiver = match receiver_type {
        Some(r) if !r.is_empty() => r,
        _ => return definer.to_string(),
    };

    if receiver == definer {
        return definer.to_string();
    }

    if receiver_is_type {
        // Anonymous types have no name of their own
        return match receiver_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => definer.to_string(),
        };
    }

    format!("{} < {}", receiver, definer)
}
