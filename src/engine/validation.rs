use std::collections::BTreeSet;

use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, ValidationError};

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_amount(amount: Decimal, what: &'static str) -> Result<(), EngineError> {
    if amount < Decimal::ZERO {
        return Err(ValidationError::NegativeAmount(what).into());
    }
    Ok(())
}

pub(crate) fn validate_reason(reason: Option<&str>) -> Result<(), EngineError> {
    if reason.is_some_and(|r| r.len() > MAX_REASON_LEN) {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

/// Length and horizon checks shared by new bookings and edits.
pub(crate) fn validate_stay_limits(stay: &StayRange, today: NaiveDate) -> Result<(), EngineError> {
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    if (stay.check_in() - today).num_days() > MAX_ADVANCE_DAYS {
        return Err(EngineError::LimitExceeded("check-in too far ahead"));
    }
    Ok(())
}

/// A new booking may not start in the past.
pub(crate) fn validate_new_stay(stay: &StayRange, today: NaiveDate) -> Result<(), EngineError> {
    if stay.check_in() < today {
        return Err(ValidationError::CheckInInPast {
            check_in: stay.check_in(),
            today,
        }
        .into());
    }
    validate_stay_limits(stay, today)
}

pub(crate) fn validate_guests(guests: u32, category: &RoomCategory) -> Result<(), EngineError> {
    if guests == 0 {
        return Err(ValidationError::NoGuests.into());
    }
    let max = category.max_occupancy.min(MAX_GUESTS);
    if guests > max {
        return Err(ValidationError::TooManyGuests { requested: guests, max }.into());
    }
    Ok(())
}

/// Resolve selected extras to their prices. Every id must exist; ids not in
/// `already_selected` must also still be offered.
pub(crate) fn resolve_extras(
    selected: &BTreeSet<Ulid>,
    already_selected: &BTreeSet<Ulid>,
    catalog: &DashMap<Ulid, ExtraService>,
) -> Result<Vec<Decimal>, EngineError> {
    if selected.len() > MAX_EXTRAS_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many extras on booking"));
    }
    let mut prices = Vec::with_capacity(selected.len());
    for id in selected {
        let extra = catalog.get(id).ok_or(ValidationError::UnknownExtra(*id))?;
        if !extra.active && !already_selected.contains(id) {
            return Err(ValidationError::ExtraInactive(*id).into());
        }
        prices.push(extra.price);
    }
    Ok(prices)
}

/// The category must be open for booking and, when a specific room is
/// requested, the room must be one of its bookable rooms.
pub(crate) fn validate_target(state: &CategoryState, room_id: Option<Ulid>) -> Result<(), EngineError> {
    if !state.category.active {
        return Err(ValidationError::CategoryInactive(state.category.id).into());
    }
    if let Some(room_id) = room_id {
        let room = state.room(room_id).ok_or(ValidationError::RoomNotInCategory {
            room: room_id,
            category: state.category.id,
        })?;
        if !room.status.is_bookable() {
            return Err(ValidationError::RoomNotBookable {
                room: room_id,
                status: room.status,
            }
            .into());
        }
    }
    Ok(())
}
