use std::collections::BTreeSet;

use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;

use super::audit::{group_edits, EditGroup};
use super::availability;
use super::cancellation::CancellationQuote;
use super::pricing::{price_breakdown, PriceBreakdown};
use super::validation::{resolve_extras, validate_stay_limits};
use super::{Engine, EngineError};

/// A category that can take the requested stay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOffer {
    pub category: RoomCategory,
    pub free_rooms: usize,
    /// Room-only price for the stay.
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub categories: usize,
    pub rooms: usize,
    /// Bookings that are neither cancelled nor completed.
    pub live_bookings: usize,
}

impl Engine {
    /// Whether the category (any bookable room) or the specific room is free
    /// for the whole stay. `exclude` skips one booking, the one being edited.
    pub async fn is_available(
        &self,
        target: BookingTarget,
        stay: &StayRange,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let category_id = match target {
            BookingTarget::Category(id) => id,
            BookingTarget::Room(id) => self.category_of_room(&id).ok_or(EngineError::NotFound(id))?,
        };
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let guard = cs.read().await;
        let available = availability::is_available(&guard, target, stay, exclude);
        tracing::debug!(
            "{target:?} {}..{}: {}",
            stay.check_in(),
            stay.check_out(),
            if available { "free" } else { "taken" }
        );
        Ok(available)
    }

    /// Free bookable rooms of a category, in room-number order.
    pub async fn free_rooms(&self, category_id: Ulid, stay: &StayRange) -> Result<Vec<Room>, EngineError> {
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let guard = cs.read().await;
        Ok(availability::free_rooms(&guard, stay, None)
            .into_iter()
            .filter_map(|id| guard.room(id).cloned())
            .collect())
    }

    /// Active categories that fit `guests` and still have a room free for
    /// the stay, cheapest first.
    pub async fn search_categories(&self, stay: &StayRange, guests: u32) -> Result<Vec<CategoryOffer>, EngineError> {
        validate_stay_limits(stay, self.now().date_naive())?;
        let states: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();

        let mut offers = Vec::new();
        for cs in states {
            let guard = cs.read().await;
            if !guard.category.active || guests == 0 || guests > guard.category.max_occupancy {
                continue;
            }
            let free = availability::free_rooms(&guard, stay, None).len();
            if free == 0 {
                continue;
            }
            let price = price_breakdown(guard.category.nightly_rate, stay, std::iter::empty())?.total;
            offers.push(CategoryOffer {
                category: guard.category.clone(),
                free_rooms: free,
                price,
            });
        }
        offers.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.category.name.cmp(&b.category.name)));
        Ok(offers)
    }

    /// Price a stay without booking it. Extras must be on offer.
    pub async fn quote_stay(
        &self,
        category_id: Ulid,
        stay: &StayRange,
        extras: &BTreeSet<Ulid>,
    ) -> Result<PriceBreakdown, EngineError> {
        let prices = resolve_extras(extras, &BTreeSet::new(), &self.extras)?;
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let rate = cs.read().await.category.nightly_rate;
        price_breakdown(rate, stay, prices)
    }

    /// What cancelling now would cost.
    pub async fn cancellation_quote(&self, booking_id: Ulid) -> Result<CancellationQuote, EngineError> {
        let booking = self.get_booking(booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }
        self.policy.compute_fee(&booking, self.now().date_naive())
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let category_id = self
            .category_of_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let guard = cs.read().await;
        guard.booking(booking_id).cloned().ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn find_booking_by_number(&self, number: &str) -> Option<Booking> {
        let id = *self.booking_numbers.get(number)?.value();
        self.get_booking(id).await.ok()
    }

    /// All bookings of a category, by check-in.
    pub async fn bookings_for_category(&self, category_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let guard = cs.read().await;
        Ok(guard.bookings.clone())
    }

    /// All bookings of a guest, by check-in.
    pub async fn bookings_for_guest(&self, guest_id: UserId) -> Vec<Booking> {
        let states: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for cs in states {
            let guard = cs.read().await;
            out.extend(guard.bookings.iter().filter(|b| b.guest_id == guest_id).cloned());
        }
        out.sort_by_key(|b| (b.stay.check_in(), b.id));
        out
    }

    /// Every audit record of a booking, oldest first.
    pub fn modification_history(&self, booking_id: Ulid) -> Vec<ModificationRecord> {
        self.modifications
            .get(&booking_id)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn edit_history(&self, booking_id: Ulid) -> Vec<EditGroup> {
        group_edits(&self.modification_history(booking_id))
    }

    pub fn cancellation_record(&self, booking_id: Ulid) -> Option<CancellationRecord> {
        self.cancellations.get(&booking_id).map(|c| c.value().clone())
    }

    /// Categories sorted by name.
    pub async fn list_categories(&self) -> Vec<RoomCategory> {
        let states: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(states.len());
        for cs in states {
            out.push(cs.read().await.category.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn list_rooms(&self, category_id: Ulid) -> Result<Vec<Room>, EngineError> {
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let guard = cs.read().await;
        Ok(guard.rooms.clone())
    }

    /// Extra services, including retired ones, sorted by name.
    pub fn list_extras(&self) -> Vec<ExtraService> {
        let mut out: Vec<ExtraService> = self.extras.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn inventory_summary(&self) -> InventorySummary {
        let states: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut summary = InventorySummary {
            categories: states.len(),
            ..Default::default()
        };
        for cs in states {
            let guard = cs.read().await;
            summary.rooms += guard.rooms.len();
            summary.live_bookings += guard.bookings.iter().filter(|b| !b.status.is_terminal()).count();
        }
        summary
    }
}
