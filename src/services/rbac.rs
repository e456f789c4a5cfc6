//! Role policy
//!
//! Which shipment fields each role may edit, and the coarse permissions
//! derived from the role enumeration. Everything here is pure.

use crate::models::{ShipmentField, UserRole};

/// Identity and operational fields
const ALL_FIELDS: &[ShipmentField] = &ShipmentField::ALL;

/// What the people moving the freight may correct
const FIELD_CREW_FIELDS: &[ShipmentField] = &[
    ShipmentField::Vehicle,
    ShipmentField::Driver,
    ShipmentField::Weight,
    ShipmentField::Destination,
    ShipmentField::Phone,
];

const NO_FIELDS: &[ShipmentField] = &[];

pub fn editable_fields(role: UserRole) -> &'static [ShipmentField] {
    match role {
        UserRole::Admin | UserRole::It => ALL_FIELDS,
        UserRole::Ops | UserRole::Dispatch | UserRole::Warehouse => FIELD_CREW_FIELDS,
        UserRole::Finance | UserRole::Driver => NO_FIELDS,
    }
}

pub fn can_edit(role: UserRole, field: ShipmentField) -> bool {
    editable_fields(role).contains(&field)
}

/// Roles that may edit anything may also open new shipments
pub fn can_create_shipments(role: UserRole) -> bool {
    !editable_fields(role).is_empty()
}

pub fn can_add_admin_notes(role: UserRole) -> bool {
    matches!(role, UserRole::Admin | UserRole::It)
}

pub fn can_manage_users(role: UserRole) -> bool {
    matches!(role, UserRole::It)
}
