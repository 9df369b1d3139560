//! Room registry and short-code generation

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::info;

use super::room::Room;

/// Code alphabet, ambiguity-reduced: 0/O and 1/I are excluded
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Room codes are four symbols drawn from the alphabet
pub const CODE_LEN: usize = 4;

/// Process-wide map of live rooms, keyed by code. The only place rooms are
/// created and destroyed.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create a room under a code that is free at the instant of insertion.
    /// The vacant-entry insert makes check-then-insert atomic with respect to
    /// concurrent creation.
    pub fn create(&self) -> Arc<Room> {
        loop {
            let code = random_code();
            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    let room = Arc::new(Room::new(code));
                    entry.insert(room.clone());
                    info!(
                        room = %room.code,
                        active_rooms = self.rooms.len(),
                        "Room created"
                    );
                    return room;
                }
            }
        }
    }

    /// Look up a room by code, case-insensitively
    pub fn lookup(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms
            .get(&code.to_ascii_uppercase())
            .map(|entry| entry.value().clone())
    }

    /// Delete a room entry. Called exactly once per room, at the moment its
    /// client list empties.
    pub fn remove(&self, code: &str) -> Option<Arc<Room>> {
        let removed = self.rooms.remove(code).map(|(_, room)| room);
        if removed.is_some() {
            info!(room = %code, active_rooms = self.rooms.len(), "Room removed");
        }
        removed
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_clients(&self) -> usize {
        self.rooms
            .iter()
            .map(|entry| entry.value().client_count())
            .sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
