use rand::Rng;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Result of checking a supplied code against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    Valid,
    NotFound,
    Expired,
}

/// Uniform over the full six-digit range, leading zeros included.
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

fn classify(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> OtpOutcome {
    match expires_at {
        None => OtpOutcome::NotFound,
        Some(t) if t < now => OtpOutcome::Expired,
        Some(_) => OtpOutcome::Valid,
    }
}

pub struct OtpRecord;

impl OtpRecord {
    /// Stores a fresh code for the destination. The upsert on the email
    /// primary key supersedes any previous code atomically, so two racing
    /// sends can never leave two live codes.
    pub async fn issue(db: &PgPool, email: &str, ttl_minutes: i64) -> anyhow::Result<String> {
        let code = generate_code();
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);
        sqlx::query(
            r#"
            INSERT INTO otps (email, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(email)
        .bind(&code)
        .bind(expires_at)
        .execute(db)
        .await?;
        debug!(email = %email, "otp issued");
        Ok(code)
    }

    /// Consumes a matching code in a single statement. A matched record is
    /// deleted whether fresh or expired, so no code can be tried twice; a
    /// mismatch deletes nothing.
    pub async fn verify(db: &PgPool, email: &str, code: &str) -> anyhow::Result<OtpOutcome> {
        let row: Option<(OffsetDateTime,)> = sqlx::query_as(
            r#"
            DELETE FROM otps
            WHERE email = $1 AND code = $2
            RETURNING expires_at
            "#,
        )
        .bind(email)
        .bind(code)
        .fetch_optional(db)
        .await?;
        Ok(classify(row.map(|(t,)| t), OffsetDateTime::now_utc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(code.parse::<u32>().expect("numeric") < 1_000_000);
        }
    }

    #[test]
    fn codes_cover_values_below_100000() {
        // The naive 100000 + rand * 900000 formula never yields these.
        let found = (0..1000).any(|_| generate_code().starts_with('0'));
        assert!(found, "no leading-zero code in 1000 draws");
    }

    #[test]
    fn classify_missing_row_is_not_found() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(classify(None, now), OtpOutcome::NotFound);
    }

    #[test]
    fn classify_past_expiry_is_expired() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            classify(Some(now - Duration::seconds(1)), now),
            OtpOutcome::Expired
        );
    }

    #[test]
    fn classify_future_expiry_is_valid() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            classify(Some(now + Duration::minutes(10)), now),
            OtpOutcome::Valid
        );
    }

    // DB-backed tests; run with `cargo test -- --ignored` against a
    // migrated Postgres pointed to by DATABASE_URL.

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL for DB tests");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");
        pool
    }

    fn unique_email(tag: &str) -> String {
        format!("{}-{}@example.com", tag, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn issued_code_verifies_exactly_once() {
        let db = test_pool().await;
        let email = unique_email("otp-once");
        let code = OtpRecord::issue(&db, &email, 10).await.expect("issue");
        assert_eq!(
            OtpRecord::verify(&db, &email, &code).await.expect("verify"),
            OtpOutcome::Valid
        );
        // Consumed: the same code never validates twice
        assert_eq!(
            OtpRecord::verify(&db, &email, &code).await.expect("verify"),
            OtpOutcome::NotFound
        );
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn reissue_supersedes_previous_code() {
        let db = test_pool().await;
        let email = unique_email("otp-supersede");
        let first = OtpRecord::issue(&db, &email, 10).await.expect("issue");
        let second = loop {
            let code = OtpRecord::issue(&db, &email, 10).await.expect("reissue");
            if code != first {
                break code;
            }
        };
        assert_eq!(
            OtpRecord::verify(&db, &email, &first).await.expect("verify"),
            OtpOutcome::NotFound
        );
        assert_eq!(
            OtpRecord::verify(&db, &email, &second).await.expect("verify"),
            OtpOutcome::Valid
        );
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn expired_code_is_rejected_and_consumed() {
        let db = test_pool().await;
        let email = unique_email("otp-expired");
        // Negative TTL puts expires_at in the past
        let code = OtpRecord::issue(&db, &email, -1).await.expect("issue");
        assert_eq!(
            OtpRecord::verify(&db, &email, &code).await.expect("verify"),
            OtpOutcome::Expired
        );
        assert_eq!(
            OtpRecord::verify(&db, &email, &code).await.expect("verify"),
            OtpOutcome::NotFound
        );
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn wrong_code_leaves_record_live() {
        let db = test_pool().await;
        let email = unique_email("otp-mismatch");
        let code = OtpRecord::issue(&db, &email, 10).await.expect("issue");
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert_eq!(
            OtpRecord::verify(&db, &email, wrong).await.expect("verify"),
            OtpOutcome::NotFound
        );
        assert_eq!(
            OtpRecord::verify(&db, &email, &code).await.expect("verify"),
            OtpOutcome::Valid
        );
    }
}
