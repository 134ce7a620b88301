//! Room bookkeeping.
//!
//! A room has exactly one host (the connection that created it) and at most
//! one guest. Each connection belongs to at most one room at a time. When
//! the host leaves the room is closed; when the guest leaves the slot opens
//! again.

use std::collections::HashMap;

use multiplay_core::{RoomCode, ROOM_CODE_LEN};
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one WebSocket connection for its lifetime.
pub type ConnectionId = Uuid;

/// Letters and digits that cannot be confused when read aloud or typed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Fresh codes tried before giving up on a collision streak.
const MAX_CODE_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("connection is already in room {0}")]
    AlreadyInRoom(RoomCode),

    #[error("room {0} does not exist")]
    NotFound(RoomCode),

    #[error("room {0} already has a guest")]
    Full(RoomCode),

    #[error("room limit of {0} reached")]
    LimitReached(usize),

    #[error("no free room code found")]
    CodeSpaceExhausted,
}

#[derive(Debug)]
struct Room {
    host: ConnectionId,
    guest: Option<ConnectionId>,
}

/// Draws a random room code from [`CODE_ALPHABET`].
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> Option<RoomCode> {
    let code: String = (0..ROOM_CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect();
    RoomCode::parse(&code).ok()
}

/// All open rooms and who is in them.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
    membership: HashMap<ConnectionId, RoomCode>,
    max_rooms: usize,
}

impl RoomRegistry {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            membership: HashMap::new(),
            max_rooms,
        }
    }

    /// Opens a room hosted by `host` under a code no live room uses.
    ///
    /// # Errors
    ///
    /// - [`RoomError::AlreadyInRoom`] if `host` is a member of another room.
    /// - [`RoomError::LimitReached`] if the room cap is hit.
    /// - [`RoomError::CodeSpaceExhausted`] if every attempt collided.
    pub fn create_room<R: Rng + ?Sized>(
        &mut self,
        host: ConnectionId,
        rng: &mut R,
    ) -> Result<RoomCode, RoomError> {
        if let Some(existing) = self.membership.get(&host) {
            return Err(RoomError::AlreadyInRoom(existing.clone()));
        }
        if self.rooms.len() >= self.max_rooms {
            return Err(RoomError::LimitReached(self.max_rooms));
        }
        for _ in 0..MAX_CODE_ATTEMPTS {
            let Some(code) = generate_room_code(rng) else {
                continue;
            };
            if self.rooms.contains_key(&code) {
                continue;
            }
            self.rooms.insert(code.clone(), Room { host, guest: None });
            self.membership.insert(host, code.clone());
            return Ok(code);
        }
        Err(RoomError::CodeSpaceExhausted)
    }

    /// Seats `guest` in room `code` and returns the host to notify.
    ///
    /// # Errors
    ///
    /// - [`RoomError::AlreadyInRoom`] if `guest` is a member of a room.
    /// - [`RoomError::NotFound`] if no such room is open.
    /// - [`RoomError::Full`] if the room already has a guest.
    pub fn join_room(
        &mut self,
        guest: ConnectionId,
        code: &RoomCode,
    ) -> Result<ConnectionId, RoomError> {
        if let Some(existing) = self.membership.get(&guest) {
            return Err(RoomError::AlreadyInRoom(existing.clone()));
        }
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if room.guest.is_some() {
            return Err(RoomError::Full(code.clone()));
        }
        room.guest = Some(guest);
        self.membership.insert(guest, code.clone());
        Ok(room.host)
    }

    /// The other member of room `code`, provided `from` is in that room.
    pub fn peer_of(&self, from: ConnectionId, code: &RoomCode) -> Option<ConnectionId> {
        if self.membership.get(&from) != Some(code) {
            return None;
        }
        let room = self.rooms.get(code)?;
        if room.host == from {
            room.guest
        } else {
            Some(room.host)
        }
    }

    /// Removes `conn` from its room and returns the member left behind.
    ///
    /// A departing host closes the room, which also releases the guest.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<ConnectionId> {
        let code = self.membership.remove(&conn)?;
        let room = self.rooms.get_mut(&code)?;
        if room.host == conn {
            let guest = room.guest;
            self.rooms.remove(&code);
            if let Some(guest) = guest {
                self.membership.remove(&guest);
            }
            guest
        } else {
            room.guest = None;
            Some(room.host)
        }
    }

    pub fn room_of(&self, conn: ConnectionId) -> Option<&RoomCode> {
        self.membership.get(&conn)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(crate::domain::config::DEFAULT_MAX_ROOMS)
    }
}
