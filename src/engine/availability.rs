use ulid::Ulid;

use crate::model::*;

// ── Overlap checking ─────────────────────────────────────────────

/// Whether `room_id` has no live booking conflicting with `stay`.
///
/// Cancelled bookings never block. `exclude` names a booking that is being
/// re-validated after an edit so it does not block itself.
pub fn room_is_free(state: &CategoryState, room_id: Ulid, stay: &StayRange, exclude: Option<Ulid>) -> bool {
    !state
        .conflicting(stay)
        .any(|b| b.room_id == room_id && b.holds_room() && Some(b.id) != exclude)
}

/// Bookable rooms of the category that are free for the whole stay, in
/// room-number order.
pub fn free_rooms(state: &CategoryState, stay: &StayRange, exclude: Option<Ulid>) -> Vec<Ulid> {
    state
        .rooms
        .iter()
        .filter(|r| r.status.is_bookable())
        .filter(|r| room_is_free(state, r.id, stay, exclude))
        .map(|r| r.id)
        .collect()
}

/// True iff at least one room of the target is free for the whole stay.
///
/// For `BookingTarget::Room` the room must belong to `state` and be
/// bookable; a room that is out of service is simply not available.
pub fn is_available(state: &CategoryState, target: BookingTarget, stay: &StayRange, exclude: Option<Ulid>) -> bool {
    match target {
        BookingTarget::Category(_) => state
            .rooms
            .iter()
            .any(|r| r.status.is_bookable() && room_is_free(state, r.id, stay, exclude)),
        BookingTarget::Room(room_id) => state
            .room(room_id)
            .is_some_and(|r| r.status.is_bookable() && room_is_free(state, room_id, stay, exclude)),
    }
}

/// Choose the room a booking lands in: the requested room if free, else the
/// preferred room (the booking's current room on edit) if free, else the
/// first free room.
pub fn assign_room(
    state: &CategoryState,
    stay: &StayRange,
    requested: Option<Ulid>,
    preferred: Option<Ulid>,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    if let Some(room_id) = requested {
        return is_available(state, BookingTarget::Room(room_id), stay, exclude).then_some(room_id);
    }
    let free = free_rooms(state, stay, exclude);
    if let Some(p) = preferred
        && free.contains(&p)
    {
        return Some(p);
    }
    free.first().copied()
}
