use sqlx::PgPool;

/// Test-only schema bootstrap, mirroring what the repositories expect.
pub(crate) async fn ensure_schema(pool: &PgPool) -> Option<()> {
    sqlx::query(
        "create table if not exists tenants (
           id uuid primary key,
           name text not null,
           base_url text not null,
           consumer_key text not null,
           consumer_secret text not null,
           webhook_secret text not null,
           currency text not null default 'USD',
           timezone text not null default 'UTC',
           enabled boolean not null default true,
           created_at timestamptz not null default now(),
           updated_at timestamptz not null default now()
         )",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create table if not exists sync_jobs (
           id uuid primary key,
           tenant_id uuid not null,
           entity_type text not null,
           mode text not null,
           external_id bigint,
           status text not null default 'queued',
           attempts integer not null default 0,
           run_after timestamptz not null default now(),
           cancel_requested boolean not null default false,
           last_error text,
           started_at timestamptz,
           finished_at timestamptz,
           created_at timestamptz not null default now(),
           updated_at timestamptz not null default now()
         )",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create unique index if not exists sync_jobs_active_key
         on sync_jobs (tenant_id, entity_type)
         where status in ('queued', 'running')",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create table if not exists sync_runs (
           id uuid primary key,
           tenant_id uuid not null,
           entity_type text not null,
           status text not null,
           items_processed integer not null default 0,
           items_skipped integer not null default 0,
           error_message text,
           started_at timestamptz not null,
           completed_at timestamptz
         )",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create table if not exists sync_checkpoints (
           tenant_id uuid not null,
           entity_type text not null,
           last_synced_at timestamptz not null,
           updated_at timestamptz not null,
           primary key (tenant_id, entity_type)
         )",
    )
    .execute(pool)
    .await
    .ok()?;

    sqlx::query(
        "create table if not exists canonical_records (
           id uuid primary key,
           tenant_id uuid not null,
           entity_type text not null,
           external_id bigint not null,
           status text,
           title text,
           total_amount numeric,
           currency text,
           customer_email text,
           rating integer check (rating is null or rating between 1 and 5),
           external_created_at timestamptz,
           external_updated_at timestamptz not null,
           payload jsonb not null,
           schema_version integer not null,
           synced_at timestamptz not null,
           first_seen_at timestamptz not null
         )",
    )
    .execute(pool)
    .await
    .ok()?;
    Some(())
}
