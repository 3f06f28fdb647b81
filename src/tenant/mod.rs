pub mod provisioner;
pub mod registry;
pub mod slug;
pub mod store;

use serde::Serialize;

/// One independently branded content site, backed by its own isolated store.
///
/// Lives in the control-plane `tenants` table. Content rows never live here;
/// they belong to the tenant's own database file.
#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub id: String,
    pub domain: String,
    pub display_name: String,
    pub database_name: String,
    pub is_active: bool,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub contact_email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) const TENANT_COLUMNS: &str =
    "id, domain, display_name, database_name, is_active, logo_url, primary_color, contact_email, \
     created_at, updated_at";

impl Tenant {
    /// Map a row selected with [`TENANT_COLUMNS`].
    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            domain: row.get(1)?,
            display_name: row.get(2)?,
            database_name: row.get(3)?,
            is_active: row.get::<_, i64>(4)? != 0,
            logo_url: row.get(5)?,
            primary_color: row.get(6)?,
            contact_email: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}
