//! Staff assignment resolver.

use std::sync::Arc;

use common::{RestaurantId, StaffId};
use serde::{Deserialize, Serialize};

use crate::services::StaffDirectory;

/// What happened to the assignment step of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "staff_id", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// A staff member was assigned.
    Assigned(StaffId),
    /// Nobody qualified; the order stays pending.
    NoStaffAvailable,
    /// Another actor changed the order between selection and assignment.
    Superseded,
    /// The order kept the staff member who placed it.
    NotRequired,
    /// The assignment write failed; the order stays pending.
    Failed,
}

impl AssignmentOutcome {
    pub fn staff_id(&self) -> Option<StaffId> {
        match self {
            AssignmentOutcome::Assigned(id) => Some(*id),
            _ => None,
        }
    }
}

/// Picks a staff member for a restaurant.
///
/// Selection is not exclusive: two concurrent calls may pick the same
/// person. Exclusivity is enforced by the conditional order update.
#[derive(Clone)]
pub struct AssignmentResolver {
    directory: Arc<dyn StaffDirectory>,
}

impl AssignmentResolver {
    pub fn new(directory: Arc<dyn StaffDirectory>) -> Self {
        Self { directory }
    }

    /// Returns the first active, available staff member not in `exclude`.
    ///
    /// A directory failure counts as nobody available.
    #[tracing::instrument(skip(self, exclude), fields(excluded = exclude.len()))]
    pub async fn auto_assign_staff(
        &self,
        restaurant_id: RestaurantId,
        exclude: &[StaffId],
    ) -> Option<StaffId> {
        match self.directory.staff_for(restaurant_id).await {
            Ok(staff) => staff
                .into_iter()
                .find(|m| m.can_take_orders() && !exclude.contains(&m.id))
                .map(|m| m.id),
            Err(e) => {
                tracing::warn!(%restaurant_id, error = %e, "Staff directory lookup failed");
                None
            }
        }
    }
}
