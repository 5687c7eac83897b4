use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound of the experience score.
pub const MAX_XP: u32 = 100;
/// Experience awarded per successful exchange.
pub const XP_PER_EXCHANGE: u32 = 5;
/// A mission is completed every this many user turns.
pub const TURNS_PER_MISSION: usize = 10;
/// Missions available in a session.
pub const TOTAL_MISSIONS: u32 = 10;
/// Experience covered by one level.
pub const XP_PER_LEVEL: u32 = 20;

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
}

/// One entry of the conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Creation instant in epoch milliseconds.
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Everything that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub missions_completed: u32,
    #[serde(default = "default_total_missions")]
    pub total_missions: u32,
}

fn default_total_missions() -> u32 {
    TOTAL_MISSIONS
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            xp: 0,
            missions_completed: 0,
            total_missions: TOTAL_MISSIONS,
        }
    }
}

impl SessionState {
    /// Pull a state read from storage back inside the invariants.
    pub fn normalized(mut self) -> Self {
        self.total_missions = TOTAL_MISSIONS;
        self.xp = self.xp.min(MAX_XP);
        self.missions_completed = self.missions_completed.min(self.total_missions);
        self
    }

    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    pub fn level(&self) -> u32 {
        level(self.xp)
    }

    /// Award the per-exchange experience and, on every tenth user turn,
    /// one mission.
    pub fn record_exchange(&mut self) {
        self.xp = add_xp(self.xp, XP_PER_EXCHANGE);

        let turns = self.user_turns();
        if turns > 0 && turns % TURNS_PER_MISSION == 0 {
            self.missions_completed = (self.missions_completed + 1).min(self.total_missions);
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

pub fn add_xp(current: u32, amount: u32) -> u32 {
    current.saturating_add(amount).min(MAX_XP)
}

pub fn level(xp: u32) -> u32 {
    xp.min(MAX_XP) / XP_PER_LEVEL + 1
}

/// `<epoch-millis>-<9 base36 chars>`
pub fn generate_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let alphabet = Uniform::from(0..BASE36.len());
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.sample(alphabet)] as char)
        .collect();
    format!("{}-{}", millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_xp_clamps() {
        assert_eq!(add_xp(0, 5), 5);
        assert_eq!(add_xp(98, 5), 100);
        assert_eq!(add_xp(100, 5), 100);
        assert_eq!(add_xp(u32::MAX, 5), 100);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level(0), 1);
        assert_eq!(level(19), 1);
        assert_eq!(level(20), 2);
        assert_eq!(level(100), 6);
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_mission_awarded_every_tenth_turn() {
        let mut state = SessionState::default();
        for turn in 1..=25 {
            state.messages.push(Message::user(format!("q{}", turn)));
            state.record_exchange();
            state.messages.push(Message::assistant("a"));
        }
        assert_eq!(state.missions_completed, 2);
        assert_eq!(state.xp, 100);
    }

    #[test]
    fn test_missions_capped() {
        let mut state = SessionState::default();
        for turn in 0..(TURNS_PER_MISSION * 15) {
            state.messages.push(Message::user(format!("q{}", turn)));
            state.record_exchange();
        }
        assert_eq!(state.missions_completed, state.total_missions);
    }

    #[test]
    fn test_normalized_repairs_out_of_range_values() {
        let state = SessionState {
            messages: Vec::new(),
            xp: 450,
            missions_completed: 99,
            total_missions: 3,
        }
        .normalized();
        assert_eq!(state.xp, 100);
        assert_eq!(state.total_missions, TOTAL_MISSIONS);
        assert_eq!(state.missions_completed, TOTAL_MISSIONS);
    }

    #[test]
    fn test_reads_legacy_model_role() {
        let json = r#"{"id":"1-abc","role":"model","content":"hi","timestamp":1}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(serde_json::to_value(&message).unwrap()["role"], "assistant");
    }

    #[test]
    fn test_state_uses_camel_case_keys() {
        let value = serde_json::to_value(SessionState::default()).unwrap();
        assert_eq!(value["missionsCompleted"], 0);
        assert_eq!(value["totalMissions"], 10);
    }
}
