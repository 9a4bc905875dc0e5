// src/pipeline/stage.rs
//! Tick stages and the values they pass along

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// One named unit of work within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Notify the store that a tick has begun and (re)arm the watchdog
    Start,
    /// Fetch the ids of every active user
    GetUsers,
    /// Fan the user ids out onto the `users` queue
    AddUsersToQueue,
    /// Barrier until every user item is acknowledged
    WaitForUsers,
    /// Fetch the ids of every active room
    GetRooms,
    /// Fan the room ids out onto the `rooms` queue
    AddRoomsToQueue,
    /// Barrier until every room item is acknowledged
    WaitForRooms,
    /// Flush buffered store mutations
    Commit1,
    /// Run the global simulation bookkeeping hook
    Global,
    /// Flush buffered store mutations again
    Commit2,
    /// Advance the global tick counter
    IncrementGameTime,
    /// Tell the store per-room processing is complete
    NotifyRoomsDone,
    /// Run the caller-supplied extension hook
    Custom,
    /// Cancel the watchdog; always runs
    Finish,
}

impl Stage {
    /// The canonical stage order of one tick
    pub const CANONICAL: [Stage; 14] = [
        Stage::Start,
        Stage::GetUsers,
        Stage::AddUsersToQueue,
        Stage::WaitForUsers,
        Stage::GetRooms,
        Stage::AddRoomsToQueue,
        Stage::WaitForRooms,
        Stage::Commit1,
        Stage::Global,
        Stage::Commit2,
        Stage::IncrementGameTime,
        Stage::NotifyRoomsDone,
        Stage::Custom,
        Stage::Finish,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::GetUsers => "get_users",
            Stage::AddUsersToQueue => "add_users_to_queue",
            Stage::WaitForUsers => "wait_for_users",
            Stage::GetRooms => "get_rooms",
            Stage::AddRoomsToQueue => "add_rooms_to_queue",
            Stage::WaitForRooms => "wait_for_rooms",
            Stage::Commit1 => "commit1",
            Stage::Global => "global",
            Stage::Commit2 => "commit2",
            Stage::IncrementGameTime => "increment_game_time",
            Stage::NotifyRoomsDone => "notify_rooms_done",
            Stage::Custom => "custom",
            Stage::Finish => "finish",
        }
    }

    /// Look a stage up by name
    pub fn parse(name: &str) -> Option<Stage> {
        static BY_NAME: Lazy<HashMap<&'static str, Stage>> =
            Lazy::new(|| Stage::CANONICAL.iter().map(|s| (s.name(), *s)).collect());
        BY_NAME.get(name).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value carried from one stage to the next
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageData {
    #[default]
    Empty,
    /// Active user ids out of `get_users`
    Users(Vec<String>),
    /// Active room ids out of `get_rooms`
    Rooms(Vec<String>),
    /// New tick counter out of `increment_game_time`
    GameTime(u64),
}

impl StageData {
    pub fn into_ids(self) -> Vec<String> {
        match self {
            StageData::Users(ids) | StageData::Rooms(ids) => ids,
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        assert_eq!(Stage::CANONICAL.len(), 14);
        assert_eq!(Stage::CANONICAL.first(), Some(&Stage::Start));
        assert_eq!(Stage::CANONICAL.last(), Some(&Stage::Finish));
        // The two barriers sit directly after their fan-out stages.
        let pos = |s: Stage| Stage::CANONICAL.iter().position(|x| *x == s).unwrap();
        assert_eq!(pos(Stage::WaitForUsers), pos(Stage::AddUsersToQueue) + 1);
        assert_eq!(pos(Stage::WaitForRooms), pos(Stage::AddRoomsToQueue) + 1);
    }

    #[test]
    fn test_parse_round_trip() {
        for stage in Stage::CANONICAL {
            assert_eq!(Stage::parse(stage.name()), Some(stage));
        }
        assert_eq!(Stage::parse("no_such_stage"), None);
    }

    #[test]
    fn test_into_ids() {
        assert!(StageData::Empty.into_ids().is_empty());
        assert_eq!(
            StageData::Users(vec!["u1".into()]).into_ids(),
            vec!["u1".to_string()]
        );
    }
}
