//! Mapping from positioner signals to controller tag names.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// A signal the HMI exchanges with the positioner controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum TagRole {
    /// Controller wall clock, seconds field (read)
    WallClockSeconds,
    /// Heartbeat echo back to the controller (write)
    HeartbeatAck,
    /// Operator target position (write)
    CommandPosition,
    /// Operator motion request bit (write)
    ManualRun,
    /// One-shot re-zero request bit (write)
    Home,
    /// Position requested by the robot cell (read)
    RobotRequestedPosition,
    /// Positioner feedback angle (read)
    CurrentPosition,
    /// Position the controller is currently targeting (read)
    RequestedPosition,
    /// Robot motion request bit (read)
    RobotRequest,
    /// Controller motion complete flag (read)
    MotionComplete,
}

impl TagRole {
    /// Whether the HMI writes this tag (as opposed to reading it).
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            TagRole::HeartbeatAck | TagRole::CommandPosition | TagRole::ManualRun | TagRole::Home
        )
    }
}

/// Controller tag names for every [`TagRole`].
///
/// Defaults match the positioner cell's PLC program. Override individual
/// names through `tag_map.json` in the settings directory; missing keys keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagMap {
    pub wall_clock_seconds: String,
    pub heartbeat_ack: String,
    pub command_position: String,
    pub manual_run: String,
    pub home: String,
    pub robot_requested_position: String,
    pub current_position: String,
    pub requested_position: String,
    pub robot_request: String,
    pub motion_complete: String,
}

impl Default for TagMap {
    fn default() -> Self {
        Self {
            wall_clock_seconds: "Wall_Clock_System_Time.Sec".to_string(),
            heartbeat_ack: "Z2_Dial_Vision.Heartbeat_From_Server".to_string(),
            command_position: "CommandPos".to_string(),
            manual_run: "test.0".to_string(),
            home: "test.2".to_string(),
            robot_requested_position: "RobotRequestedPosition".to_string(),
            current_position: "Positioner.CurrentPosition".to_string(),
            requested_position: "RequestedPosition".to_string(),
            robot_request: "IRC5:I.Data[0].0".to_string(),
            motion_complete: "PositionerMotionOk".to_string(),
        }
    }
}

impl TagMap {
    /// Tag name for a role.
    pub fn name(&self, role: TagRole) -> &str {
        match role {
            TagRole::WallClockSeconds => &self.wall_clock_seconds,
            TagRole::HeartbeatAck => &self.heartbeat_ack,
            TagRole::CommandPosition => &self.command_position,
            TagRole::ManualRun => &self.manual_run,
            TagRole::Home => &self.home,
            TagRole::RobotRequestedPosition => &self.robot_requested_position,
            TagRole::CurrentPosition => &self.current_position,
            TagRole::RequestedPosition => &self.requested_position,
            TagRole::RobotRequest => &self.robot_request,
            TagRole::MotionComplete => &self.motion_complete,
        }
    }

    /// Reverse lookup, used by the simulator to route writes.
    pub fn role_of(&self, tag: &str) -> Option<TagRole> {
        use strum::IntoEnumIterator;
        TagRole::iter().find(|role| self.name(*role) == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_default_names() {
        let map = TagMap::default();
        assert_eq!(map.name(TagRole::CommandPosition), "CommandPos");
        assert_eq!(map.name(TagRole::MotionComplete), "PositionerMotionOk");
        assert_eq!(map.name(TagRole::WallClockSeconds), "Wall_Clock_System_Time.Sec");
    }

    #[test]
    fn test_role_lookup_round_trips() {
        let map = TagMap::default();
        for role in TagRole::iter() {
            assert_eq!(map.role_of(map.name(role)), Some(role));
        }
        assert_eq!(map.role_of("NoSuchTag"), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let map: TagMap = serde_json::from_str(r#"{"home": "Positioner.Home"}"#).unwrap();
        assert_eq!(map.home, "Positioner.Home");
        assert_eq!(map.manual_run, "test.0");
    }

    #[test]
    fn test_outputs() {
        let outputs: Vec<_> = TagRole::iter().filter(|r| r.is_output()).collect();
        assert_eq!(outputs.len(), 4);
        assert!(!TagRole::MotionComplete.is_output());
    }
}
