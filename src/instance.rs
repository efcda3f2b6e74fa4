// Compute Instance
//
// The framework-owned view of an instance. The session only reads it.

use std::fmt;
use uuid::Uuid;

/// Instance handed to the driver by the orchestration framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance name, also used as the container and profile name
    pub name: String,

    pub uuid: Uuid,

    /// Image the instance boots from, used as the LXD image alias
    pub image_ref: String,
}

impl Instance {
    /// Create an instance with a fresh UUID
    pub fn new(name: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            image_ref: image_ref.into(),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}
