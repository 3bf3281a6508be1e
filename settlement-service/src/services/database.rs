//! Database service for settlement-service.

use crate::models::{
    compute_commission, monthly_recurring_revenue, BillingFrequency, CreatePartner,
    CreateSubscription, DashboardSummary, Deal, DealStatus, Invoice, InvoiceStatus,
    ListInvoicesFilter, ListSubscriptionsFilter, Partner, RegisterDeal, Subscription,
    SubscriptionStatus, INVOICE_DUE_GRACE_DAYS,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, contract_number, client_name, client_email, client_phone, service_type, property_address, notes, frequency, amount, start_date, next_billing_date, status, created_utc, updated_utc";

const PARTNER_COLUMNS: &str = "partner_id, name, email, phone, company, commission_rate, status, total_sales, total_commission, pending_commission, created_utc, updated_utc";

const DEAL_COLUMNS: &str = "deal_id, partner_id, client_name, deal_value, commission_rate, commission, status, locked, created_utc, updated_utc, paid_utc";

// Invoice reads derive `overdue` from the due date so no background job has
// to flip stored state.
const INVOICE_READ_COLUMNS: &str = "invoice_id, invoice_number, subscription_id, client_name, service_type, amount, period_start, period_end, issue_date, due_date, CASE WHEN status = 'pending' AND due_date < CURRENT_DATE THEN 'overdue' ELSE status END AS status, created_utc, paid_utc";

const INVOICE_COLUMNS: &str = "invoice_id, invoice_number, subscription_id, client_name, service_type, amount, period_start, period_end, issue_date, due_date, status, created_utc, paid_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "settlement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Create a new AMC subscription.
    ///
    /// The first billing date is the start date; it only moves when an
    /// invoice is generated.
    #[instrument(skip(self, input), fields(client = %input.client_name))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let seq = sqlx::query_scalar::<_, i64>("SELECT nextval('contract_number_seq')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to allocate contract number: {}", e))
            })?;
        let contract_number = format!("AMC-{:05}", seq);

        let subscription_id = Uuid::new_v4();
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO amc_subscriptions (subscription_id, contract_number, client_name, client_email, client_phone, service_type, property_address, notes, frequency, amount, start_date, next_billing_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, 'active')
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .bind(&contract_number)
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(&input.client_phone)
        .bind(&input.service_type)
        .bind(&input.property_address)
        .bind(&input.notes)
        .bind(input.frequency.as_str())
        .bind(input.amount)
        .bind(input.start_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e))
        })?;

        timer.observe_duration();
        info!(
            subscription_id = %subscription.subscription_id,
            contract_number = %subscription.contract_number,
            frequency = %subscription.frequency,
            "Subscription created"
        );

        Ok(subscription)
    }

    /// Get a subscription by ID.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM amc_subscriptions
            WHERE subscription_id = $1
            "#,
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// List subscriptions, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list_subscriptions(
        &self,
        filter: &ListSubscriptionsFilter,
    ) -> Result<Vec<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_subscriptions"])
            .start_timer();

        let subscriptions = if let Some(status) = filter.status {
            sqlx::query_as::<_, Subscription>(&format!(
                r#"
                SELECT {SUBSCRIPTION_COLUMNS}
                FROM amc_subscriptions
                WHERE status = $1
                ORDER BY created_utc DESC
                "#,
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Subscription>(&format!(
                r#"
                SELECT {SUBSCRIPTION_COLUMNS}
                FROM amc_subscriptions
                ORDER BY created_utc DESC
                "#,
            ))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list subscriptions: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscriptions)
    }

    /// List active subscriptions for MRR aggregation.
    #[instrument(skip(self))]
    pub async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, AppError> {
        self.list_subscriptions(&ListSubscriptionsFilter {
            status: Some(SubscriptionStatus::Active),
        })
        .await
    }

    /// Change a subscription's status.
    ///
    /// Cancelled is terminal; suspended contracts may be reactivated.
    #[instrument(skip(self), fields(subscription_id = %subscription_id, new_status = %new_status.as_str()))]
    pub async fn update_subscription_status(
        &self,
        subscription_id: Uuid,
        new_status: SubscriptionStatus,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_subscription_status"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM amc_subscriptions
            WHERE subscription_id = $1
            FOR UPDATE
            "#,
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

        let current = SubscriptionStatus::from_string(&subscription.status);
        if current.is_terminal() {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Cancelled subscription cannot change status"
            )));
        }
        if current == new_status {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Subscription is already {}",
                current.as_str()
            )));
        }

        let updated = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE amc_subscriptions
            SET status = $2, updated_utc = now()
            WHERE subscription_id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .bind(new_status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update subscription: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            subscription_id = %subscription_id,
            from = %current.as_str(),
            to = %new_status.as_str(),
            "Subscription status changed"
        );

        Ok(updated)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// Generate the invoice for a subscription's current billing cycle and
    /// advance the cycle pointer, atomically.
    ///
    /// The subscription row is locked for the duration; the invoice insert is
    /// guarded by the unique (subscription_id, period_start) index and the
    /// pointer advance is a compare-and-swap on its previous value, so a
    /// concurrent loser gets a conflict instead of a duplicate row.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn generate_invoice(
        &self,
        subscription_id: Uuid,
    ) -> Result<(Invoice, Subscription), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["generate_invoice"])
            .start_timer();

        let today = Utc::now().date_naive();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM amc_subscriptions
            WHERE subscription_id = $1
            FOR UPDATE
            "#,
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

        if subscription.status != SubscriptionStatus::Active.as_str() {
            return Err(AppError::Unprocessable(anyhow::anyhow!(
                "Subscription must be active to generate an invoice (current: {})",
                subscription.status
            )));
        }

        let frequency = BillingFrequency::from_string(&subscription.frequency);
        let period_start = subscription.next_billing_date;
        let period_end = frequency.advance(period_start);

        // If the latest invoice already covers past today, the running cycle
        // is billed; generating again would bill ahead of schedule.
        let latest_period_end = sqlx::query_scalar::<_, chrono::NaiveDate>(
            r#"
            SELECT period_end FROM amc_invoices
            WHERE subscription_id = $1
            ORDER BY period_start DESC
            LIMIT 1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check latest invoice: {}", e))
        })?;

        if let Some(latest) = latest_period_end {
            if latest > today {
                return Err(AppError::DuplicateCycle(anyhow::anyhow!(
                    "Invoice already exists for the current billing cycle (covered through {})",
                    latest
                )));
            }
        }

        let seq = sqlx::query_scalar::<_, i64>("SELECT nextval('invoice_number_seq')")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
            })?;
        let invoice_number = format!("INV-{:06}", seq);

        let invoice_id = Uuid::new_v4();
        let due_date = today + chrono::Duration::days(INVOICE_DUE_GRACE_DAYS);

        let result = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO amc_invoices (invoice_id, invoice_number, subscription_id, client_name, service_type, amount, period_start, period_end, issue_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(&invoice_number)
        .bind(subscription_id)
        .bind(&subscription.client_name)
        .bind(&subscription.service_type)
        .bind(subscription.amount)
        .bind(period_start)
        .bind(period_end)
        .bind(today)
        .bind(due_date)
        .fetch_one(&mut *tx)
        .await;

        let invoice = match result {
            Ok(invoice) => invoice,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                // Concurrent generation for the same cycle pointer lost the race.
                tx.rollback().await.ok();
                return Err(AppError::DuplicateCycle(anyhow::anyhow!(
                    "Invoice already exists for the cycle starting {}",
                    period_start
                )));
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create invoice: {}",
                    e
                )));
            }
        };

        let updated = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE amc_subscriptions
            SET next_billing_date = $3, updated_utc = now()
            WHERE subscription_id = $1 AND next_billing_date = $2
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#,
        ))
        .bind(subscription_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance billing cycle: {}", e))
        })?
        .ok_or_else(|| {
            AppError::ConcurrencyConflict(anyhow::anyhow!(
                "Billing cycle advanced concurrently; retry the operation"
            ))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            subscription_id = %subscription_id,
            amount = %invoice.amount,
            period_start = %period_start,
            period_end = %period_end,
            "Invoice generated"
        );

        Ok((invoice, updated))
    }

    /// Get an invoice by ID, with read-time overdue derivation.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_READ_COLUMNS}
            FROM amc_invoices
            WHERE invoice_id = $1
            "#,
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// List invoices, newest first, with read-time overdue derivation.
    #[instrument(skip(self, filter))]
    pub async fn list_invoices(&self, filter: &ListInvoicesFilter) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = if let Some(status) = filter.status {
            sqlx::query_as::<_, Invoice>(&format!(
                r#"
                SELECT {INVOICE_READ_COLUMNS}
                FROM amc_invoices
                WHERE ($2::uuid IS NULL OR subscription_id = $2)
                  AND CASE WHEN status = 'pending' AND due_date < CURRENT_DATE THEN 'overdue' ELSE status END = $1
                ORDER BY created_utc DESC
                "#,
            ))
            .bind(status.as_str())
            .bind(filter.subscription_id)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Invoice>(&format!(
                r#"
                SELECT {INVOICE_READ_COLUMNS}
                FROM amc_invoices
                WHERE ($1::uuid IS NULL OR subscription_id = $1)
                ORDER BY created_utc DESC
                "#,
            ))
            .bind(filter.subscription_id)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Mark an invoice paid. Pending and overdue invoices settle; paying an
    /// already-paid invoice is a conflict, never a second credit.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn mark_invoice_paid(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_paid"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM amc_invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if InvoiceStatus::from_string(&invoice.status) == InvoiceStatus::Paid {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Invoice {} is already paid",
                invoice.invoice_number
            )));
        }

        let updated = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE amc_invoices
            SET status = 'paid', paid_utc = now()
            WHERE invoice_id = $1
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(invoice_id = %invoice_id, invoice_number = %updated.invoice_number, "Invoice paid");

        Ok(updated)
    }

    // =========================================================================
    // Partner Operations
    // =========================================================================

    /// Create a new sales partner.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_partner(&self, input: &CreatePartner) -> Result<Partner, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_partner"])
            .start_timer();

        let partner_id = Uuid::new_v4();
        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            INSERT INTO partners (partner_id, name, email, phone, company, commission_rate, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            RETURNING {PARTNER_COLUMNS}
            "#,
        ))
        .bind(partner_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(input.commission_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create partner: {}", e)))?;

        timer.observe_duration();
        info!(partner_id = %partner.partner_id, name = %partner.name, "Partner created");

        Ok(partner)
    }

    /// Get a partner by ID.
    #[instrument(skip(self), fields(partner_id = %partner_id))]
    pub async fn get_partner(&self, partner_id: Uuid) -> Result<Option<Partner>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_partner"])
            .start_timer();

        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            SELECT {PARTNER_COLUMNS}
            FROM partners
            WHERE partner_id = $1
            "#,
        ))
        .bind(partner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get partner: {}", e)))?;

        timer.observe_duration();

        Ok(partner)
    }

    /// List partners, newest first.
    #[instrument(skip(self))]
    pub async fn list_partners(&self) -> Result<Vec<Partner>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_partners"])
            .start_timer();

        let partners = sqlx::query_as::<_, Partner>(&format!(
            r#"
            SELECT {PARTNER_COLUMNS}
            FROM partners
            ORDER BY created_utc DESC
            "#,
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list partners: {}", e)))?;

        timer.observe_duration();

        Ok(partners)
    }

    /// Change a partner's commission rate.
    ///
    /// Applies to deals registered afterwards only; existing deals keep the
    /// rate snapshotted at their registration.
    #[instrument(skip(self), fields(partner_id = %partner_id))]
    pub async fn update_partner_rate(
        &self,
        partner_id: Uuid,
        commission_rate: Decimal,
    ) -> Result<Partner, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_partner_rate"])
            .start_timer();

        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            UPDATE partners
            SET commission_rate = $2, updated_utc = now()
            WHERE partner_id = $1
            RETURNING {PARTNER_COLUMNS}
            "#,
        ))
        .bind(partner_id)
        .bind(commission_rate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update partner: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Partner not found")))?;

        timer.observe_duration();
        info!(partner_id = %partner_id, rate = %commission_rate, "Partner commission rate changed");

        Ok(partner)
    }

    // =========================================================================
    // Deal Operations
    // =========================================================================

    /// Register a deal for a partner.
    ///
    /// Snapshots the partner's commission rate, computes the commission once,
    /// locks the deal, and moves the partner's pending totals in the same
    /// transaction with the partner row locked.
    #[instrument(skip(self, input), fields(partner_id = %partner_id))]
    pub async fn register_deal(
        &self,
        partner_id: Uuid,
        input: &RegisterDeal,
    ) -> Result<(Deal, Partner), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["register_deal"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            SELECT {PARTNER_COLUMNS}
            FROM partners
            WHERE partner_id = $1
            FOR UPDATE
            "#,
        ))
        .bind(partner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get partner: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Partner not found")))?;

        let commission = compute_commission(input.deal_value, partner.commission_rate);

        let deal_id = Uuid::new_v4();
        let deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            INSERT INTO partner_deals (deal_id, partner_id, client_name, deal_value, commission_rate, commission, status, locked)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', TRUE)
            RETURNING {DEAL_COLUMNS}
            "#,
        ))
        .bind(deal_id)
        .bind(partner_id)
        .bind(&input.client_name)
        .bind(input.deal_value)
        .bind(partner.commission_rate)
        .bind(commission)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create deal: {}", e)))?;

        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            UPDATE partners
            SET total_sales = total_sales + $2,
                pending_commission = pending_commission + $3,
                updated_utc = now()
            WHERE partner_id = $1
            RETURNING {PARTNER_COLUMNS}
            "#,
        ))
        .bind(partner_id)
        .bind(input.deal_value)
        .bind(commission)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update partner totals: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            deal_id = %deal.deal_id,
            partner_id = %partner_id,
            deal_value = %deal.deal_value,
            commission = %deal.commission,
            "Deal registered and locked"
        );

        Ok((deal, partner))
    }

    /// Get a deal by ID.
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn get_deal(&self, deal_id: Uuid) -> Result<Option<Deal>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_deal"])
            .start_timer();

        let deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            SELECT {DEAL_COLUMNS}
            FROM partner_deals
            WHERE deal_id = $1
            "#,
        ))
        .bind(deal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get deal: {}", e)))?;

        timer.observe_duration();

        Ok(deal)
    }

    /// List a partner's deals, newest first.
    #[instrument(skip(self), fields(partner_id = %partner_id))]
    pub async fn list_partner_deals(&self, partner_id: Uuid) -> Result<Vec<Deal>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_partner_deals"])
            .start_timer();

        let deals = sqlx::query_as::<_, Deal>(&format!(
            r#"
            SELECT {DEAL_COLUMNS}
            FROM partner_deals
            WHERE partner_id = $1
            ORDER BY created_utc DESC
            "#,
        ))
        .bind(partner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list deals: {}", e)))?;

        timer.observe_duration();

        Ok(deals)
    }

    /// Approve a pending deal. No monetary change; the commission stays in
    /// the partner's pending total.
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn approve_deal(&self, deal_id: Uuid) -> Result<Deal, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["approve_deal"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let deal = Self::get_deal_for_update(&mut tx, deal_id).await?;

        let current = DealStatus::from_string(&deal.status);
        if !current.can_transition_to(DealStatus::Approved) {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Only pending deals can be approved (current: {})",
                deal.status
            )));
        }

        let updated = sqlx::query_as::<_, Deal>(&format!(
            r#"
            UPDATE partner_deals
            SET status = 'approved', updated_utc = now()
            WHERE deal_id = $1
            RETURNING {DEAL_COLUMNS}
            "#,
        ))
        .bind(deal_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update deal: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(deal_id = %deal_id, "Deal approved");

        Ok(updated)
    }

    /// Pay out a deal's commission.
    ///
    /// approved -> paid is the standard path; pending -> paid is accepted as
    /// a fast path and logged distinctly. Paying a paid or rejected deal is a
    /// conflict, so the partner can never be credited twice.
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn pay_commission(&self, deal_id: Uuid) -> Result<(Deal, Partner), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["pay_commission"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let deal = Self::get_deal_for_update(&mut tx, deal_id).await?;

        let current = DealStatus::from_string(&deal.status);
        if current == DealStatus::Paid {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Deal commission is already paid"
            )));
        }
        if !current.can_transition_to(DealStatus::Paid) {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Deal cannot be paid from status {}",
                deal.status
            )));
        }
        let fast_path = current == DealStatus::Pending;

        let updated_deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            UPDATE partner_deals
            SET status = 'paid', paid_utc = now(), updated_utc = now()
            WHERE deal_id = $1
            RETURNING {DEAL_COLUMNS}
            "#,
        ))
        .bind(deal_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update deal: {}", e)))?;

        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            UPDATE partners
            SET pending_commission = pending_commission - $2,
                total_commission = total_commission + $2,
                updated_utc = now()
            WHERE partner_id = $1
            RETURNING {PARTNER_COLUMNS}
            "#,
        ))
        .bind(deal.partner_id)
        .bind(deal.commission)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update partner totals: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            deal_id = %deal_id,
            partner_id = %deal.partner_id,
            commission = %deal.commission,
            fast_path = fast_path,
            "Commission paid"
        );

        Ok((updated_deal, partner))
    }

    /// Reject a deal. Reverses its contribution to the partner's pending
    /// commission. Terminal states stay put.
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn reject_deal(&self, deal_id: Uuid) -> Result<(Deal, Partner), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reject_deal"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let deal = Self::get_deal_for_update(&mut tx, deal_id).await?;

        let current = DealStatus::from_string(&deal.status);
        if !current.can_transition_to(DealStatus::Rejected) {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Deal cannot be rejected from status {}",
                deal.status
            )));
        }

        let updated_deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            UPDATE partner_deals
            SET status = 'rejected', updated_utc = now()
            WHERE deal_id = $1
            RETURNING {DEAL_COLUMNS}
            "#,
        ))
        .bind(deal_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update deal: {}", e)))?;

        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            UPDATE partners
            SET pending_commission = pending_commission - $2,
                updated_utc = now()
            WHERE partner_id = $1
            RETURNING {PARTNER_COLUMNS}
            "#,
        ))
        .bind(deal.partner_id)
        .bind(deal.commission)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update partner totals: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            deal_id = %deal_id,
            partner_id = %deal.partner_id,
            commission = %deal.commission,
            "Deal rejected, pending commission reversed"
        );

        Ok((updated_deal, partner))
    }

    async fn get_deal_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        deal_id: Uuid,
    ) -> Result<Deal, AppError> {
        sqlx::query_as::<_, Deal>(&format!(
            r#"
            SELECT {DEAL_COLUMNS}
            FROM partner_deals
            WHERE deal_id = $1
            FOR UPDATE
            "#,
        ))
        .bind(deal_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get deal: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Deal not found")))
    }

    // =========================================================================
    // Dashboard Aggregation
    // =========================================================================

    /// Recompute the settlement dashboard from source rows.
    ///
    /// Reads take no locks; a figure may be marginally stale relative to
    /// in-flight writers, which is acceptable for an advisory view.
    #[instrument(skip(self))]
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["dashboard_summary"])
            .start_timer();

        let active_subscriptions = self.list_active_subscriptions().await?;
        let mrr = monthly_recurring_revenue(&active_subscriptions);

        let (pending_invoices, overdue_invoices) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending' AND due_date >= CURRENT_DATE),
                COUNT(*) FILTER (WHERE status = 'pending' AND due_date < CURRENT_DATE)
            FROM amc_invoices
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e)))?;

        let (partners, total_sales, pending_payouts, total_commission_paid) =
            sqlx::query_as::<_, (i64, Decimal, Decimal, Decimal)>(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(total_sales), 0),
                    COALESCE(SUM(pending_commission), 0),
                    COALESCE(SUM(total_commission), 0)
                FROM partners
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to aggregate partners: {}", e))
            })?;

        timer.observe_duration();

        Ok(DashboardSummary {
            active_subscriptions: active_subscriptions.len() as i64,
            monthly_recurring_revenue: mrr,
            pending_invoices,
            overdue_invoices,
            partners,
            total_sales,
            pending_payouts,
            total_commission_paid,
        })
    }
}
