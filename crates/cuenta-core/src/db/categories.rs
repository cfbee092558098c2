//! Category operations
//!
//! Categories are owner-scoped and at most two levels deep. Creation is
//! find-or-create: a unique index on `(user_id, COALESCE(parent_id, 0), name)`
//! arbitrates concurrent creators, and the loser of that race re-reads the
//! winner's row.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Category, CategoryNode};

/// Default two-level taxonomy offered to new users
pub const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("Comida", &["Mandado", "Restaurantes", "Delivery", "Café", "Bares"]),
    (
        "Transporte",
        &["Gasolina", "Uber/Didi", "Metro/Bus", "Estacionamiento", "Mantenimiento"],
    ),
    ("Compras", &["Ropa", "Electrónicos", "Hogar", "Libros", "Deportes"]),
    (
        "Entretenimiento",
        &["Cine", "Streaming", "Juegos", "Conciertos", "Eventos"],
    ),
    ("Salud", &["Farmacia", "Doctores", "Gimnasio", "Seguro", "Dental"]),
    ("Servicios", &["Luz", "Agua", "Internet", "Teléfono", "Gas"]),
    ("Ingresos", &["Nómina", "Freelance", "Inversiones", "Bonos", "Otros"]),
    ("Educación", &["Cursos", "Libros", "Software", "Certificaciones"]),
    (
        "Viajes",
        &["Hoteles", "Vuelos", "Transporte", "Comidas", "Actividades"],
    ),
    ("Regalos", &["Cumpleaños", "Navidad", "Aniversario", "Otros"]),
    ("Impuestos", &["ISR", "IVA", "Predial", "Tenencia", "Otros"]),
    (
        "Ahorros",
        &["Cuenta de Ahorro", "Inversiones", "Fondo de Emergencia"],
    ),
];

fn find_category(
    conn: &Connection,
    user_id: i64,
    parent_id: Option<i64>,
    name: &str,
) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM categories WHERE user_id = ? AND parent_id IS ? AND name = ?",
            params![user_id, parent_id, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Insert a category; a uniqueness violation means someone else created it first
fn insert_or_refetch(
    conn: &Connection,
    user_id: i64,
    parent_id: Option<i64>,
    name: &str,
) -> Result<(i64, bool)> {
    let inserted = conn.execute(
        "INSERT INTO categories (user_id, parent_id, name) VALUES (?, ?, ?)",
        params![user_id, parent_id, name],
    );

    match inserted {
        Ok(_) => Ok((conn.last_insert_rowid(), true)),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            debug!(user_id, name, "Category created concurrently, re-fetching");
            let id = find_category(conn, user_id, parent_id, name)?.ok_or_else(|| {
                Error::InvalidData(format!(
                    "category '{}' violates a constraint but does not exist",
                    name
                ))
            })?;
            Ok((id, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Find or create a category on an open connection (or transaction)
///
/// Returns the category id and whether it was created by this call.
pub fn find_or_create_category_in(
    conn: &Connection,
    user_id: i64,
    parent_id: Option<i64>,
    name: &str,
) -> Result<(i64, bool)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidData("category name is empty".into()));
    }

    if let Some(id) = find_category(conn, user_id, parent_id, name)? {
        return Ok((id, false));
    }
    insert_or_refetch(conn, user_id, parent_id, name)
}

impl Database {
    /// Find or create a category; returns its id
    pub fn find_or_create_category(
        &self,
        user_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        if let Some(parent) = parent_id {
            let parent_is_root: bool = conn
                .query_row(
                    "SELECT parent_id IS NULL FROM categories WHERE id = ? AND user_id = ?",
                    params![parent, user_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| Error::NotFound(format!("category {}", parent)))?;
            if !parent_is_root {
                return Err(Error::InvalidData(
                    "categories are limited to two levels".into(),
                ));
            }
        }
        Ok(find_or_create_category_in(&conn, user_id, parent_id, name)?.0)
    }

    /// Get a category by ID
    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, user_id, parent_id, name FROM categories WHERE id = ?",
                params![id],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        parent_id: row.get(2)?,
                        name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(category)
    }

    /// All categories of a user, parents first
    pub fn list_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, parent_id, name FROM categories
             WHERE user_id = ?
             ORDER BY parent_id IS NOT NULL, name",
        )?;
        let categories = stmt
            .query_map(params![user_id], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    parent_id: row.get(2)?,
                    name: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Parent names with their children's names, both sorted by name
    pub fn category_taxonomy(&self, user_id: i64) -> Result<Vec<CategoryNode>> {
        let categories = self.list_categories(user_id)?;

        let mut nodes: Vec<(i64, CategoryNode)> = categories
            .iter()
            .filter(|c| c.parent_id.is_none())
            .map(|c| {
                (
                    c.id,
                    CategoryNode {
                        name: c.name.clone(),
                        subcategories: Vec::new(),
                    },
                )
            })
            .collect();

        for child in categories.iter().filter(|c| c.parent_id.is_some()) {
            if let Some((_, node)) = nodes.iter_mut().find(|(id, _)| Some(*id) == child.parent_id) {
                node.subcategories.push(child.name.clone());
            }
        }

        Ok(nodes
            .into_iter()
            .map(|(_, mut node)| {
                node.subcategories.sort();
                node
            })
            .collect())
    }

    /// Seed the default taxonomy for a user (idempotent - skips existing categories)
    ///
    /// Returns how many categories were created.
    pub fn seed_default_categories(&self, user_id: i64) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut created = 0;
        for (parent, children) in DEFAULT_CATEGORIES {
            let (parent_id, new_parent) = find_or_create_category_in(&tx, user_id, None, parent)?;
            created += usize::from(new_parent);
            for child in children.iter() {
                let (_, new_child) = find_or_create_category_in(&tx, user_id, Some(parent_id), child)?;
                created += usize::from(new_child);
            }
        }

        tx.commit()?;
        info!(user_id, created, "Seeded default categories");
        Ok(created)
    }
}
