//! Room membership, capacity and idle reclamation.
//!
//! `RoomManager` owns every room on this node. A room exists from the first
//! successful join until its last member leaves or the idle sweep reclaims
//! it. Each room carries a broadcast channel; connections subscribe on join
//! and see the channel close when the room is deleted.
//!
//! Membership is counted per connection: a user with two open sockets stays
//! a member until both have left.
//!
//! The lock is a `parking_lot::Mutex` and is never held across an await.

use crate::errors::RoomError;
use crate::frames::ServerFrame;
use common::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

/// Buffered frames per room before slow receivers start lagging.
pub const ROOM_EVENT_CAPACITY: usize = 64;

/// Admission ceilings and idle lifetime.
#[derive(Debug, Clone, Copy)]
pub struct RoomLimits {
    pub max_rooms: usize,
    pub max_users_per_room: usize,
    pub idle_ttl_ms: u64,
}

#[derive(Debug)]
struct Room {
    /// Open connections per member.
    members: HashMap<String, usize>,
    last_activity_at: u64,
    events: broadcast::Sender<ServerFrame>,
}

/// Successful join.
#[derive(Debug)]
pub struct Admission {
    /// Members after the join.
    pub user_count: usize,
    /// Room event stream for this connection.
    pub events: broadcast::Receiver<ServerFrame>,
}

/// Outcome of one connection leaving a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The user still has another connection in the room.
    StillConnected,
    /// The user's last connection left.
    Left { remaining: usize },
}

/// Activity gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RoomStats {
    pub rooms: usize,
    pub users: usize,
}

#[derive(Debug)]
pub struct RoomManager {
    rooms: Mutex<HashMap<String, Room>>,
    limits: RoomLimits,
    clock: Arc<dyn Clock>,
}

impl RoomManager {
    pub fn new(limits: RoomLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> RoomLimits {
        self.limits
    }

    /// Admit `user_id` into `room_id`, creating the room if needed.
    ///
    /// A user already in the room is always readmitted, even at the member
    /// ceiling.
    ///
    /// # Errors
    ///
    /// - `RoomError::BadRequest` - empty room or user id
    /// - `RoomError::RoomsFull` - room absent and the node is at its room ceiling
    /// - `RoomError::RoomFull` - room at its member ceiling
    #[instrument(skip_all, name = "node.rooms.join", fields(room_id = %room_id, user_id = %user_id))]
    pub fn join(&self, room_id: &str, user_id: &str) -> Result<Admission, RoomError> {
        if room_id.is_empty() {
            return Err(RoomError::BadRequest("roomId"));
        }
        if user_id.is_empty() {
            return Err(RoomError::BadRequest("userId"));
        }

        let now = self.clock.now_ms();
        let mut rooms = self.rooms.lock();

        if !rooms.contains_key(room_id) {
            if rooms.len() >= self.limits.max_rooms {
                return Err(RoomError::RoomsFull);
            }
            let (events, _) = broadcast::channel(ROOM_EVENT_CAPACITY);
            rooms.insert(
                room_id.to_string(),
                Room {
                    members: HashMap::new(),
                    last_activity_at: now,
                    events,
                },
            );
            info!(target: "node.rooms", room_id = %room_id, "Room created");
        }

        let room = rooms
            .get_mut(room_id)
            .ok_or(RoomError::BadRequest("roomId"))?;

        if !room.members.contains_key(user_id)
            && room.members.len() >= self.limits.max_users_per_room
        {
            return Err(RoomError::RoomFull);
        }

        *room.members.entry(user_id.to_string()).or_insert(0) += 1;
        room.last_activity_at = now;

        Ok(Admission {
            user_count: room.members.len(),
            events: room.events.subscribe(),
        })
    }

    /// Release one connection of `user_id` in `room_id`.
    ///
    /// The user stops being a member when their last connection leaves, and
    /// an emptied room is deleted. Returns `None` if the room or the member
    /// is unknown.
    #[instrument(skip_all, name = "node.rooms.leave", fields(room_id = %room_id, user_id = %user_id))]
    pub fn leave(&self, room_id: &str, user_id: &str) -> Option<Departure> {
        let now = self.clock.now_ms();
        let mut rooms = self.rooms.lock();
        let room = rooms.get_mut(room_id)?;
        let connections = room.members.get_mut(user_id)?;

        room.last_activity_at = now;
        if *connections > 1 {
            *connections -= 1;
            return Some(Departure::StillConnected);
        }

        room.members.remove(user_id);
        let remaining = room.members.len();

        if remaining == 0 {
            rooms.remove(room_id);
            info!(target: "node.rooms", room_id = %room_id, "Room closed (empty)");
        }
        Some(Departure::Left { remaining })
    }

    /// Refresh the room's activity stamp. Returns false for unknown rooms.
    pub fn touch(&self, room_id: &str) -> bool {
        let now = self.clock.now_ms();
        match self.rooms.lock().get_mut(room_id) {
            Some(room) => {
                room.last_activity_at = now;
                true
            }
            None => false,
        }
    }

    /// Send `frame` to every connection in `room_id`.
    ///
    /// Returns the number of receivers reached.
    pub fn publish(&self, room_id: &str, frame: ServerFrame) -> usize {
        let rooms = self.rooms.lock();
        rooms
            .get(room_id)
            .and_then(|room| room.events.send(frame).ok())
            .unwrap_or(0)
    }

    /// Delete rooms idle for longer than the configured TTL, members or not.
    ///
    /// Dropping a room's sender closes every subscribed connection's stream.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let ttl = self.limits.idle_ttl_ms;
        let mut rooms = self.rooms.lock();
        let before = rooms.len();

        rooms.retain(|room_id, room| {
            let keep = now.saturating_sub(room.last_activity_at) <= ttl;
            if !keep {
                debug!(
                    target: "node.rooms",
                    room_id = %room_id,
                    members = room.members.len(),
                    "Reclaiming idle room"
                );
            }
            keep
        });

        before - rooms.len()
    }

    pub fn member_count(&self, room_id: &str) -> Option<usize> {
        self.rooms.lock().get(room_id).map(|r| r.members.len())
    }

    /// Open connections across all members of `room_id`.
    pub fn connection_count(&self, room_id: &str) -> Option<usize> {
        self.rooms
            .lock()
            .get(room_id)
            .map(|r| r.members.values().sum())
    }

    pub fn stats(&self) -> RoomStats {
        let rooms = self.rooms.lock();
        RoomStats {
            rooms: rooms.len(),
            users: rooms.values().map(|r| r.members.len()).sum(),
        }
    }
}
