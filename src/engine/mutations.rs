use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, observe};

use super::audit::{diff_and_record, BookingSnapshot, EditContext};
use super::availability::assign_room;
use super::pricing::compute_total;
use super::validation::*;
use super::{Engine, EngineError, ValidationError};

/// Staff changes to a category. `None` leaves a field as it is. Rate
/// changes apply to future pricing only.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub nightly_rate: Option<Decimal>,
    pub max_occupancy: Option<u32>,
    pub active: Option<bool>,
}

/// A committed edit and the audit records it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditResult {
    pub booking: Booking,
    pub records: Vec<ModificationRecord>,
}

impl Engine {
    // ── Inventory ────────────────────────────────────────────

    pub async fn create_category(
        &self,
        id: Ulid,
        name: String,
        nightly_rate: Decimal,
        max_occupancy: u32,
    ) -> Result<RoomCategory, EngineError> {
        validate_name(&name)?;
        validate_amount(nightly_rate, "nightly rate")?;
        if max_occupancy == 0 {
            return Err(ValidationError::NoGuests.into());
        }

        let _catalog = self.catalog_lock.lock().await;
        if self.state.len() >= MAX_CATEGORIES {
            return Err(EngineError::LimitExceeded("too many room categories"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let category = RoomCategory {
            id,
            name,
            nightly_rate,
            max_occupancy,
            active: true,
        };
        let event = Event::CategoryCreated {
            category: category.clone(),
        };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(CategoryState::new(category.clone()))));
        info!("category {id} created: {} at {}/night", category.name, category.nightly_rate);
        Ok(category)
    }

    pub async fn update_category(&self, id: Ulid, update: CategoryUpdate) -> Result<RoomCategory, EngineError> {
        let cs = self.get_category_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = cs.write().await;

        let mut category = guard.category.clone();
        if let Some(name) = update.name {
            validate_name(&name)?;
            category.name = name;
        }
        if let Some(rate) = update.nightly_rate {
            validate_amount(rate, "nightly rate")?;
            category.nightly_rate = rate;
        }
        if let Some(max) = update.max_occupancy {
            if max == 0 {
                return Err(ValidationError::NoGuests.into());
            }
            category.max_occupancy = max;
        }
        if let Some(active) = update.active {
            category.active = active;
        }
        if category == guard.category {
            return Ok(category);
        }

        let event = Event::CategoryUpdated {
            category: category.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("category {id} updated");
        Ok(category)
    }

    pub async fn add_room(&self, id: Ulid, category_id: Ulid, number: String) -> Result<Room, EngineError> {
        validate_name(&number)?;
        if self.room_to_category.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let mut guard = cs.write().await;
        if guard.rooms.len() >= MAX_ROOMS_PER_CATEGORY {
            return Err(EngineError::LimitExceeded("too many rooms in category"));
        }

        let room = Room {
            id,
            category_id,
            number,
            status: RoomStatus::Available,
        };
        let event = Event::RoomAdded { room: room.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("room {} added to category {category_id}", room.number);
        Ok(room)
    }

    pub async fn set_room_status(&self, room_id: Ulid, status: RoomStatus) -> Result<Room, EngineError> {
        let category_id = self.category_of_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let cs = self
            .get_category_state(&category_id)
            .ok_or(EngineError::NotFound(category_id))?;
        let mut guard = cs.write().await;
        let mut room = guard.room(room_id).cloned().ok_or(EngineError::NotFound(room_id))?;
        if room.status == status {
            return Ok(room);
        }

        let event = Event::RoomStatusChanged {
            room_id,
            category_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("room {} is now {status}", room.number);
        room.status = status;
        Ok(room)
    }

    /// Create or replace an extra service. Retire one with `active: false`;
    /// bookings that already selected it keep it.
    pub async fn save_extra_service(&self, extra: ExtraService) -> Result<ExtraService, EngineError> {
        validate_name(&extra.name)?;
        validate_amount(extra.price, "extra service price")?;
        if extra.tag.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("tag too long"));
        }

        let _catalog = self.catalog_lock.lock().await;
        if !self.extras.contains_key(&extra.id) && self.extras.len() >= MAX_EXTRA_SERVICES {
            return Err(EngineError::LimitExceeded("too many extra services"));
        }
        let event = Event::ExtraServiceSaved { extra: extra.clone() };
        self.wal_append(&event).await?;
        self.extras.insert(extra.id, extra.clone());
        info!("extra service {} saved at {}", extra.name, extra.price);
        Ok(extra)
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Validate, find a room, price, and persist as PENDING. All checks run
    /// under the category write lock, so two requests can never both take
    /// the last room.
    pub async fn create_booking(
        &self,
        request: BookingRequest,
        actor: Option<UserId>,
    ) -> Result<BookingOutcome<Booking>, EngineError> {
        observe("create_booking", self.create_booking_inner(request, actor)).await
    }

    async fn create_booking_inner(
        &self,
        request: BookingRequest,
        actor: Option<UserId>,
    ) -> Result<BookingOutcome<Booking>, EngineError> {
        let now = self.now();
        let today = now.date_naive();
        let stay = request.stay;
        validate_new_stay(&stay, today)?;
        let extra_prices = resolve_extras(&request.extras, &Default::default(), &self.extras)?;

        let cs = self
            .get_category_state(&request.category_id)
            .ok_or(EngineError::NotFound(request.category_id))?;
        let mut guard = cs.write().await;
        validate_target(&guard, request.room_id)?;
        validate_guests(request.guests, &guard.category)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_CATEGORY {
            return Err(EngineError::LimitExceeded("too many bookings in category"));
        }

        let Some(room_id) = assign_room(&guard, &stay, request.room_id, None, None) else {
            debug!(
                "no room free in category {} for {}..{}",
                request.category_id,
                stay.check_in(),
                stay.check_out()
            );
            metrics::counter!(observability::NO_AVAILABILITY_TOTAL, "op" => "create").increment(1);
            return Ok(BookingOutcome::NoAvailability);
        };
        let total = compute_total(guard.category.nightly_rate, &stay, extra_prices)?;

        let booking = Booking {
            id: Ulid::new(),
            number: self.next_booking_number(),
            category_id: request.category_id,
            room_id,
            guest_id: request.guest_id,
            stay,
            guests: request.guests,
            total_price: Some(total),
            status: BookingStatus::Pending,
            modified: false,
            extras: request.extras,
            created_at: now,
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            actor = ?actor,
            "booking {} created: room {room_id}, {}..{}, total {total}",
            booking.number,
            stay.check_in(),
            stay.check_out()
        );
        Ok(BookingOutcome::Accepted(booking))
    }

    /// Apply proposed changes, re-check availability without counting the
    /// booking itself, re-price, and persist as MODIFIED together with one
    /// audit record per changed field. An edit that changes nothing writes
    /// nothing.
    pub async fn edit_booking(
        &self,
        booking_id: Ulid,
        changes: BookingChanges,
        actor: Option<UserId>,
    ) -> Result<BookingOutcome<EditResult>, EngineError> {
        observe("edit_booking", self.edit_booking_inner(booking_id, changes, actor)).await
    }

    async fn edit_booking_inner(
        &self,
        booking_id: Ulid,
        changes: BookingChanges,
        actor: Option<UserId>,
    ) -> Result<BookingOutcome<EditResult>, EngineError> {
        validate_reason(changes.reason.as_deref())?;
        let now = self.now();
        let today = now.date_naive();

        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if !current.status.can_transition_to(BookingStatus::Modified) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: BookingStatus::Modified,
            });
        }

        let stay = StayRange::new(
            changes.check_in.unwrap_or(current.stay.check_in()),
            changes.check_out.unwrap_or(current.stay.check_out()),
        )?;
        let guests = changes.guests.unwrap_or(current.guests);
        let extras = changes.extras.unwrap_or_else(|| current.extras.clone());

        if stay == current.stay && guests == current.guests && extras == current.extras {
            return Ok(BookingOutcome::Accepted(EditResult {
                booking: current,
                records: Vec::new(),
            }));
        }

        if stay.check_in() != current.stay.check_in() && stay.check_in() < today {
            return Err(ValidationError::CheckInInPast {
                check_in: stay.check_in(),
                today,
            }
            .into());
        }
        validate_stay_limits(&stay, today)?;
        validate_guests(guests, &guard.category)?;
        let extra_prices = resolve_extras(&extras, &current.extras, &self.extras)?;

        let Some(room_id) = assign_room(&guard, &stay, None, Some(current.room_id), Some(booking_id)) else {
            debug!("booking {} cannot move to {}..{}", current.number, stay.check_in(), stay.check_out());
            metrics::counter!(observability::NO_AVAILABILITY_TOTAL, "op" => "edit").increment(1);
            return Ok(BookingOutcome::NoAvailability);
        };
        let total = compute_total(guard.category.nightly_rate, &stay, extra_prices)?;

        let updated = Booking {
            room_id,
            stay,
            guests,
            total_price: Some(total),
            modified: true,
            extras,
            ..current.clone()
        };

        let ctx = EditContext {
            booking_id,
            actor,
            at: now,
            reason: changes.reason,
        };
        let catalog: HashMap<Ulid, ExtraService> = current
            .extras
            .iter()
            .chain(updated.extras.iter())
            .filter_map(|id| self.extras.get(id).map(|e| (*id, e.value().clone())))
            .collect();
        let records = diff_and_record(
            &BookingSnapshot::from(&current),
            &BookingSnapshot::from(&updated),
            &ctx,
            &catalog,
        );

        let event = Event::BookingModified {
            booking: updated.clone(),
            records: records.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::MODIFICATION_RECORDS_TOTAL).increment(records.len() as u64);
        info!(
            actor = ?actor,
            "booking {} modified: {} field(s) changed, total {total}",
            updated.number,
            records.len()
        );
        Ok(BookingOutcome::Accepted(EditResult {
            booking: updated,
            records,
        }))
    }

    /// Charge the policy fee, record the cancellation, and mark the booking
    /// CANCELLED. There is no way back.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        reason: Option<String>,
        actor: Option<UserId>,
    ) -> Result<CancellationRecord, EngineError> {
        observe("cancel_booking", self.cancel_booking_inner(booking_id, reason, actor)).await
    }

    async fn cancel_booking_inner(
        &self,
        booking_id: Ulid,
        reason: Option<String>,
        actor: Option<UserId>,
    ) -> Result<CancellationRecord, EngineError> {
        validate_reason(reason.as_deref())?;
        let now = self.now();

        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if !current.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: BookingStatus::Cancelled,
            });
        }

        let quote = self.policy.compute_fee(&current, now.date_naive())?;
        let record = CancellationRecord {
            booking_id,
            at: now,
            reason,
            fee: quote.fee,
            refund: quote.refund,
            days_before_check_in: quote.days_before_check_in,
            fee_percent: quote.fee_percent,
            actor,
        };
        let event = Event::BookingCancelled {
            category_id: current.category_id,
            record: record.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::CANCELLATIONS_TOTAL, "fee_percent" => quote.fee_percent.to_string())
            .increment(1);
        info!(
            actor = ?actor,
            "booking {} cancelled {} day(s) before check-in: fee {}, refund {}",
            current.number,
            quote.days_before_check_in,
            record.fee,
            record.refund
        );
        Ok(record)
    }

    /// Payment accepted.
    pub async fn confirm_booking(&self, booking_id: Ulid, actor: Option<UserId>) -> Result<Booking, EngineError> {
        observe("confirm_booking", self.transition(booking_id, BookingStatus::Confirmed, actor)).await
    }

    pub async fn check_in(&self, booking_id: Ulid, actor: Option<UserId>) -> Result<Booking, EngineError> {
        observe("check_in", self.transition(booking_id, BookingStatus::CheckedIn, actor)).await
    }

    pub async fn check_out(&self, booking_id: Ulid, actor: Option<UserId>) -> Result<Booking, EngineError> {
        observe("check_out", self.transition(booking_id, BookingStatus::Completed, actor)).await
    }

    async fn transition(
        &self,
        booking_id: Ulid,
        to: BookingStatus,
        actor: Option<UserId>,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let mut booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if !booking.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                to,
            });
        }

        let event = Event::BookingStatusChanged {
            booking_id,
            category_id: booking.category_id,
            status: to,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(actor = ?actor, "booking {}: {} -> {to}", booking.number, booking.status);
        booking.status = to;
        booking.modified = false;
        Ok(booking)
    }
}
