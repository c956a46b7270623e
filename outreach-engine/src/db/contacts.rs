//! Contact and ICP persistence, including the filtered audience search

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use outreach_common::models::{Contact, IcpResult};
use outreach_common::Result;

use super::{parse_ts, parse_uuid};

const CONTACT_COLUMNS: &str = r#"
    c.id, c.name, c.email, c.phone, c.role, c.company, c.location, c.category,
    c.language, c.created_at, i.buying_probability_score
"#;

/// Columns the classification agent may sample distinct values from
pub const SAMPLE_COLUMNS: [&str; 4] = ["role", "location", "category", "company"];

pub async fn insert_contact(pool: &SqlitePool, contact: &Contact) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contacts (id, name, email, phone, role, company, location, category, language, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(contact.id.to_string())
    .bind(&contact.name)
    .bind(&contact.email)
    .bind(&contact.phone)
    .bind(&contact.role)
    .bind(&contact.company)
    .bind(&contact.location)
    .bind(&contact.category)
    .bind(&contact.language)
    .bind(contact.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_icp_result(pool: &SqlitePool, icp: &IcpResult) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO icp_results (id, contact_id, buying_probability_score, label, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(icp.id.to_string())
    .bind(icp.contact_id.to_string())
    .bind(icp.buying_probability_score)
    .bind(&icp.label)
    .bind(icp.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_contact(pool: &SqlitePool, id: Uuid) -> Result<Option<Contact>> {
    let sql = format!(
        "SELECT {} FROM contacts c LEFT JOIN icp_results i ON i.contact_id = c.id WHERE c.id = ?",
        CONTACT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(contact_from_row).transpose()
}

pub async fn get_contact_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Contact>> {
    let sql = format!(
        "SELECT {} FROM contacts c LEFT JOIN icp_results i ON i.contact_id = c.id WHERE c.email = ?",
        CONTACT_COLUMNS
    );
    let row = sqlx::query(&sql).bind(email).fetch_optional(pool).await?;
    row.map(contact_from_row).transpose()
}

/// Fetch contacts for a set of email addresses
pub async fn get_contacts_by_emails(
    pool: &SqlitePool,
    emails: &[String],
) -> Result<Vec<Contact>> {
    if emails.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; emails.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM contacts c LEFT JOIN icp_results i ON i.contact_id = c.id WHERE c.email IN ({})",
        CONTACT_COLUMNS, placeholders
    );
    let mut query = sqlx::query(&sql);
    for email in emails {
        query = query.bind(email);
    }
    let rows = query.fetch_all(pool).await?;
    rows.into_iter().map(contact_from_row).collect()
}

pub async fn list_contacts(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Contact>> {
    let sql = format!(
        "SELECT {} FROM contacts c LEFT JOIN icp_results i ON i.contact_id = c.id \
         ORDER BY c.created_at DESC LIMIT ? OFFSET ?",
        CONTACT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(contact_from_row).collect()
}

pub async fn count_contacts(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Update a contact's email address captured during a voice call
pub async fn set_contact_email(pool: &SqlitePool, id: Uuid, email: &str) -> Result<()> {
    sqlx::query("UPDATE contacts SET email = ? WHERE id = ?")
        .bind(email)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Distinct non-empty values of a sampleable column, for the classification
/// prompt. `column` must be one of [`SAMPLE_COLUMNS`].
pub async fn column_samples(pool: &SqlitePool, column: &str, limit: i64) -> Result<Vec<String>> {
    assert!(
        SAMPLE_COLUMNS.contains(&column),
        "column {} is not sampleable",
        column
    );
    // Column name comes from the whitelist above, never from input
    let sql = format!(
        "SELECT DISTINCT {col} FROM contacts WHERE {col} IS NOT NULL AND {col} != '' LIMIT ?",
        col = column
    );
    let values: Vec<String> = sqlx::query_scalar(&sql).bind(limit).fetch_all(pool).await?;
    Ok(values)
}

/// Filtered audience search: LIKE matches per filter group (OR within a
/// group, AND across groups), ICP scores joined in, best scores first.
pub async fn search_contacts(
    pool: &SqlitePool,
    roles: &[String],
    locations: &[String],
    categories: &[String],
    companies: &[String],
    limit: i64,
) -> Result<Vec<Contact>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    for (column, terms) in [
        ("role", roles),
        ("location", locations),
        ("category", categories),
        ("company", companies),
    ] {
        if terms.is_empty() {
            continue;
        }
        let group = vec![format!("LOWER(c.{}) LIKE ?", column); terms.len()].join(" OR ");
        clauses.push(format!("({})", group));
        for term in terms {
            binds.push(format!("%{}%", term.to_lowercase()));
        }
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM contacts c LEFT JOIN icp_results i ON i.contact_id = c.id {} \
         ORDER BY i.buying_probability_score DESC NULLS LAST LIMIT ?",
        CONTACT_COLUMNS, where_clause
    );

    let mut query = sqlx::query(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.bind(limit).fetch_all(pool).await?;
    rows.into_iter().map(contact_from_row).collect()
}

/// Unfiltered fallback: best-scored contacts overall
pub async fn top_contacts(pool: &SqlitePool, limit: i64) -> Result<Vec<Contact>> {
    search_contacts(pool, &[], &[], &[], &[], limit).await
}

fn contact_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Contact> {
    Ok(Contact {
        id: parse_uuid(row.try_get("id")?)?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        role: row.try_get("role")?,
        company: row.try_get("company")?,
        location: row.try_get("location")?,
        category: row.try_get("category")?,
        language: row.try_get("language")?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        buying_probability_score: row.try_get("buying_probability_score")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_common::db::init_memory_database;

    async fn seed(pool: &SqlitePool) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for (name, email, role, location, score) in [
            ("Asha Rao", "asha@example.com", "CTO", "Mumbai", Some(90.0)),
            ("Ben Lee", "ben@example.com", "Engineer", "Pune", Some(40.0)),
            ("Cara Diaz", "cara@example.com", "CTO", "Berlin", None),
        ] {
            let mut contact = Contact::new(name, email);
            contact.role = Some(role.to_string());
            contact.location = Some(location.to_string());
            insert_contact(pool, &contact).await.unwrap();
            if let Some(score) = score {
                insert_icp_result(pool, &IcpResult::new(contact.id, score, None))
                    .await
                    .unwrap();
            }
            contacts.push(contact);
        }
        contacts
    }

    #[tokio::test]
    async fn search_filters_and_orders_by_score() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let found = search_contacts(&pool, &["cto".to_string()], &[], &[], &[], 50)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        // Scored contact first, unscored (NULL) last
        assert_eq!(found[0].email, "asha@example.com");
        assert_eq!(found[1].email, "cara@example.com");
    }

    #[tokio::test]
    async fn search_ands_across_filter_groups() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let found = search_contacts(
            &pool,
            &["cto".to_string()],
            &["mumbai".to_string()],
            &[],
            &[],
            50,
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "asha@example.com");
    }

    #[tokio::test]
    async fn column_samples_are_distinct() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let roles = column_samples(&pool, "role", 80).await.unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.contains(&"CTO".to_string()));
    }

    #[tokio::test]
    async fn lookup_by_emails() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let found = get_contacts_by_emails(
            &pool,
            &["asha@example.com".to_string(), "ben@example.com".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 2);

        assert!(get_contacts_by_emails(&pool, &[]).await.unwrap().is_empty());
    }
}
