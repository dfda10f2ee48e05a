use common::{RestaurantId, SessionId, StaffId};
use order_store::{ChangeFilter, Table};
use serde::{Deserialize, Serialize};

/// A realtime topic scoped to a session, a staff member or a restaurant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Channel {
    /// Customer-facing updates for one dining session.
    Session(SessionId),
    /// Assignments and status changes for one staff member.
    Staff(StaffId),
    /// The owner dashboard: every order, staff and table event of a restaurant.
    Restaurant(RestaurantId),
}

impl Channel {
    /// Registry key, e.g. `restaurant:<uuid>`.
    pub fn name(&self) -> String {
        match self {
            Channel::Session(id) => format!("session:{id}"),
            Channel::Staff(id) => format!("staff:{id}"),
            Channel::Restaurant(id) => format!("restaurant:{id}"),
        }
    }

    /// The change-feed filter a subscription to this channel uses by default.
    pub fn default_filter(&self) -> ChangeFilter {
        match self {
            Channel::Session(id) => ChangeFilter::column_eq("session_id", id).on(Table::Orders),
            Channel::Staff(id) => {
                ChangeFilter::column_eq("assigned_staff_id", id).on(Table::Orders)
            }
            Channel::Restaurant(id) => ChangeFilter::column_eq("restaurant_id", id),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        let id = SessionId::new();
        assert_eq!(Channel::Session(id).name(), format!("session:{id}"));
        let staff = StaffId::new();
        assert_eq!(Channel::Staff(staff).to_string(), format!("staff:{staff}"));
    }

    #[test]
    fn default_filters() {
        let staff = StaffId::new();
        let filter = Channel::Staff(staff).default_filter();
        assert_eq!(filter.table, Some(Table::Orders));
        assert_eq!(filter.column, "assigned_staff_id");
        assert_eq!(filter.value, staff.to_string());

        let restaurant = Channel::Restaurant(RestaurantId::new()).default_filter();
        assert_eq!(restaurant.table, None);
    }
}
