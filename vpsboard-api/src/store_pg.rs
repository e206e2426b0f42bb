use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;
use vpsboard_common::{
    ActionCount, ActualUsage, AuditEntry, CapacityLedger, Error, Instance, InstanceActionCount,
    InstanceStatus, Principal, PrincipalActionCount, Result, Snapshot, StatusAggregate,
};
use vpsboard_core::store::{AuditFilter, Store};

/// Postgres-backed [`Store`]. Uniqueness is enforced by the unique indexes on
/// `principals(username)`, `principals(email)` and `instances(address)`;
/// violations surface as the matching duplicate error instead of a 500.
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgStore { pool }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    if let Some(action) = filter
        .action_contains
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        qb.push(" AND action ILIKE ");
        qb.push_bind(format!("%{}%", action.trim()));
    }
    if let Some(instance_id) = filter.instance_id {
        qb.push(" AND instance_id = ");
        qb.push_bind(instance_id);
    }
    if let Some(principal_id) = filter.principal_id {
        qb.push(" AND principal_id = ");
        qb.push_bind(principal_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND timestamp >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND timestamp <= ");
        qb.push_bind(to);
    }
    if let Some(viewer) = filter.visible_to {
        qb.push(" AND (principal_id = ");
        qb.push_bind(viewer);
        qb.push(" OR instance_id IN (SELECT id FROM instances WHERE owner_id = ");
        qb.push_bind(viewer);
        qb.push("))");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_principal(&self, principal: &Principal) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO principals (id, username, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(principal.id)
        .bind(&principal.username)
        .bind(&principal.email)
        .bind(&principal.password_hash)
        .bind(principal.role)
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateIdentity(
                "username or email already in use".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn principal_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let row = sqlx::query_as::<_, Principal>(
            "SELECT id, username, email, password_hash, role, created_at, updated_at
             FROM principals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn principal_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let row = sqlx::query_as::<_, Principal>(
            "SELECT id, username, email, password_hash, role, created_at, updated_at
             FROM principals WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn principal_by_username(&self, username: &str) -> Result<Option<Principal>> {
        let row = sqlx::query_as::<_, Principal>(
            "SELECT id, username, email, password_hash, role, created_at, updated_at
             FROM principals WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM principals
                WHERE (username = $1 OR email = $2)
                  AND ($3::UUID IS NULL OR id <> $3)
            )",
        )
        .bind(username)
        .bind(email)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn list_principals(&self, offset: i64, limit: i64) -> Result<Vec<Principal>> {
        let rows = sqlx::query_as::<_, Principal>(
            "SELECT id, username, email, password_hash, role, created_at, updated_at
             FROM principals
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_principals(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM principals")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_principal(&self, principal: &Principal) -> Result<()> {
        let result = sqlx::query(
            "UPDATE principals
             SET username = $2, email = $3, password_hash = $4, role = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(principal.id)
        .bind(&principal.username)
        .bind(&principal.email)
        .bind(&principal.password_hash)
        .bind(principal.role)
        .bind(principal.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) if r.rows_affected() > 0 => Ok(()),
            Ok(_) => Err(Error::not_found("User")),
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateIdentity(
                "username or email already in use".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_principal(&self, id: Uuid) -> Result<bool> {
        // Owned instances and their snapshots go with the row (FK cascade).
        let result = sqlx::query("DELETE FROM principals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO instances (id, name, status, cpu, ram, storage, address, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(instance.id)
        .bind(&instance.name)
        .bind(instance.status)
        .bind(instance.cpu)
        .bind(instance.ram)
        .bind(instance.storage)
        .bind(&instance.address)
        .bind(instance.owner_id)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateAddress(
                "Address is already in use".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn instance_by_id(&self, id: Uuid) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, Instance>(
            "SELECT id, name, status, cpu, ram, storage, address, owner_id, created_at, updated_at
             FROM instances WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_instances(
        &self,
        owner: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Instance>> {
        let rows = sqlx::query_as::<_, Instance>(
            "SELECT id, name, status, cpu, ram, storage, address, owner_id, created_at, updated_at
             FROM instances
             WHERE ($1::UUID IS NULL OR owner_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_instances(&self, owner: Option<Uuid>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM instances WHERE ($1::UUID IS NULL OR owner_id = $1)",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn update_instance_fields(
        &self,
        id: Uuid,
        name: Option<&str>,
        cpu: Option<i32>,
        ram: Option<i32>,
        storage: Option<i32>,
    ) -> Result<Option<Instance>> {
        let row = sqlx::query_as::<_, Instance>(
            "UPDATE instances
             SET name = COALESCE($2, name),
                 cpu = COALESCE($3, cpu),
                 ram = COALESCE($4, ram),
                 storage = COALESCE($5, storage),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING id, name, status, cpu, ram, storage, address, owner_id, created_at, updated_at",
        )
        .bind(id)
        .bind(name)
        .bind(cpu)
        .bind(ram)
        .bind(storage)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn transition_instance(
        &self,
        id: Uuid,
        from: &[InstanceStatus],
        to: InstanceStatus,
    ) -> Result<Option<Instance>> {
        let from_states: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        // Single-statement compare-and-swap; a stale expected status means 0 rows.
        let row = sqlx::query_as::<_, Instance>(
            "UPDATE instances
             SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status::TEXT = ANY($3)
             RETURNING id, name, status, cpu, ram, storage, address, owner_id, created_at, updated_at",
        )
        .bind(id)
        .bind(to)
        .bind(&from_states)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_instance(&self, id: Uuid) -> Result<bool> {
        // Snapshots go with the row (FK cascade).
        let result = sqlx::query("DELETE FROM instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn running_usage(&self) -> Result<ActualUsage> {
        let (cpu, ram, storage, running_count): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(cpu), 0)::BIGINT,
                    COALESCE(SUM(ram), 0)::BIGINT,
                    COALESCE(SUM(storage), 0)::BIGINT,
                    COUNT(*)
             FROM instances WHERE status = 'running'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ActualUsage {
            cpu,
            ram,
            storage,
            running_count,
        })
    }

    async fn status_aggregates(&self) -> Result<Vec<StatusAggregate>> {
        let rows: Vec<(InstanceStatus, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT status,
                    COUNT(*),
                    COALESCE(SUM(cpu), 0)::BIGINT,
                    COALESCE(SUM(ram), 0)::BIGINT,
                    COALESCE(SUM(storage), 0)::BIGINT
             FROM instances
             GROUP BY status
             ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(status, count, cpu, ram, storage)| StatusAggregate {
                status,
                count,
                cpu,
                ram,
                storage,
            })
            .collect())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshots (id, instance_id, name, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(snapshot.id)
        .bind(snapshot.instance_id)
        .bind(&snapshot.name)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn snapshot_by_id(&self, id: Uuid) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, Snapshot>(
            "SELECT id, instance_id, name, created_at FROM snapshots WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_snapshots(
        &self,
        instance_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, Snapshot>(
            "SELECT id, instance_id, name, created_at
             FROM snapshots
             WHERE instance_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(instance_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_snapshots(&self, instance_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE instance_id = $1")
                .bind(instance_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_all_snapshots(&self, offset: i64, limit: i64) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, Snapshot>(
            "SELECT id, instance_id, name, created_at
             FROM snapshots
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_all_snapshots(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_snapshot(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM snapshots WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ledger(&self) -> Result<Option<CapacityLedger>> {
        let row = sqlx::query_as::<_, CapacityLedger>(
            "SELECT id, total_cpu, total_ram, total_storage, used_cpu, used_ram, used_storage, last_updated
             FROM capacity_ledger
             ORDER BY last_updated DESC, id DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_ledger(&self, ledger: &CapacityLedger) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO capacity_ledger (id, total_cpu, total_ram, total_storage, used_cpu, used_ram, used_storage, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(ledger.id)
        .bind(ledger.total_cpu)
        .bind(ledger.total_ram)
        .bind(ledger.total_storage)
        .bind(ledger.used_cpu)
        .bind(ledger.used_ram)
        .bind(ledger.used_storage)
        .bind(ledger.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_ledger(&self, ledger: &CapacityLedger) -> Result<()> {
        sqlx::query(
            "UPDATE capacity_ledger
             SET total_cpu = $2, total_ram = $3, total_storage = $4,
                 used_cpu = $5, used_ram = $6, used_storage = $7,
                 last_updated = $8
             WHERE id = $1",
        )
        .bind(ledger.id)
        .bind(ledger.total_cpu)
        .bind(ledger.total_ram)
        .bind(ledger.total_storage)
        .bind(ledger.used_cpu)
        .bind(ledger.used_ram)
        .bind(ledger.used_storage)
        .bind(ledger.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_ledger_rows(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM capacity_ledger")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, action, instance_id, principal_id, timestamp, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(entry.instance_id)
        .bind(entry.principal_id)
        .bind(entry.timestamp)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, action, instance_id, principal_id, timestamp, details
             FROM audit_log WHERE 1=1",
        );
        push_audit_filters(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC, id DESC");
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows: Vec<AuditEntry> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn count_audit(&self, filter: &AuditFilter) -> Result<i64> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM audit_log WHERE 1=1");
        push_audit_filters(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn audit_actions(&self, filter: &AuditFilter) -> Result<Vec<ActionCount>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT action, COUNT(*) FROM audit_log WHERE 1=1");
        push_audit_filters(&mut qb, filter);
        qb.push(" GROUP BY action ORDER BY COUNT(*) DESC, action ASC");

        let pairs: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(pairs
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect())
    }

    async fn audit_instances(
        &self,
        filter: &AuditFilter,
        limit: i64,
    ) -> Result<Vec<InstanceActionCount>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT instance_id, COUNT(*) FROM audit_log WHERE instance_id IS NOT NULL",
        );
        push_audit_filters(&mut qb, filter);
        qb.push(" GROUP BY instance_id ORDER BY COUNT(*) DESC, instance_id ASC");
        qb.push(" LIMIT ");
        qb.push_bind(limit);

        let pairs: Vec<(Uuid, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(pairs
            .into_iter()
            .map(|(instance_id, count)| InstanceActionCount { instance_id, count })
            .collect())
    }

    async fn audit_principals(
        &self,
        filter: &AuditFilter,
        limit: i64,
    ) -> Result<Vec<PrincipalActionCount>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT principal_id, COUNT(*) FROM audit_log WHERE 1=1");
        push_audit_filters(&mut qb, filter);
        qb.push(" GROUP BY principal_id ORDER BY COUNT(*) DESC, principal_id ASC");
        qb.push(" LIMIT ");
        qb.push_bind(limit);

        let pairs: Vec<(Uuid, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(pairs
            .into_iter()
            .map(|(principal_id, count)| PrincipalActionCount {
                principal_id,
                count,
            })
            .collect())
    }
}
