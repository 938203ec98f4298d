use getset::Getters;
use indoc::formatdoc;

use crate::job::JobState;

/// Prepared SQL text for every named operation, keyed by schema.
///
/// Each plan is computed once at manager construction and treated as an
/// opaque string from then on. The store is expected to provide the `job`
/// table and the partial unique indexes over
/// `(name, singleton_key, singleton_on)` that back singleton suppression.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Plans {
    /// Atomically claim one eligible row for a queue name
    fetch_next_job: String,
    /// Release overdue active rows back to an eligible state
    expire_job: String,
    /// Insert a created row, suppressed on singleton conflict
    insert_job: String,
    /// Transition one active row to completed
    complete_job: String,
    /// Transition one non-terminal row to cancelled
    cancel_job: String,
}

impl Plans {
    pub fn new(schema: &str) -> Self {
        Plans {
            fetch_next_job: fetch_next_job(schema),
            expire_job: expire_job(schema),
            insert_job: insert_job(schema),
            complete_job: complete_job(schema),
            cancel_job: cancel_job(schema),
        }
    }
}

/// `$1 name`. Claims one row with `FOR UPDATE SKIP LOCKED` so concurrent
/// fetchers race on the row lock, not on application state.
pub fn fetch_next_job(schema: &str) -> String {
    let created = JobState::Created;
    let retry = JobState::Retry;
    let expired = JobState::Expired;
    let active = JobState::Active;

    formatdoc!(
        r#"
            with next_job as (
                select id
                    from {schema}.job
                    where name = $1
                        and state in ('{created}', '{retry}', '{expired}')
                        and start_after <= now()
                    order by created_at, id
                    limit 1
                    for update
                    skip locked
            )
            update {schema}.job as job
                set
                    state = '{active}',
                    started_at = now(),
                    retry_count = case
                        when job.state in ('{retry}', '{expired}') then job.retry_count + 1
                        else job.retry_count
                    end
                from next_job
                where job.id = next_job.id
                returning job.id, job.data, job.started_at
        "#
    )
}

pub fn expire_job(schema: &str) -> String {
    let active = JobState::Active;
    let expired = JobState::Expired;

    formatdoc!(
        r#"
            update {schema}.job
                set state = '{expired}'
                where state = '{active}'
                    and started_at + expire_in < now()
        "#
    )
}

/// `$1 id, $2 name, $3 retry_limit, $4 start_in, $5 expire_in, $6 data,
/// $7 singleton_key, $8 singleton_seconds, $9 singleton_offset`.
///
/// `singleton_on` is the bucket boundary `floor((epoch + offset) / seconds)`
/// scaled back to a timestamp; a null `$8` leaves the row unbucketed.
pub fn insert_job(schema: &str) -> String {
    let created = JobState::Created;

    formatdoc!(
        r#"
            insert into {schema}.job (
                id, name, state, retry_limit, start_after, expire_in, data,
                singleton_key, singleton_on
            )
            values (
                $1, $2, '{created}', $3,
                now() + cast(coalesce($4, '0') as interval),
                cast($5 as interval),
                $6, $7,
                case
                    when $8::integer is not null
                    then 'epoch'::timestamptz
                        + '1 second'::interval * ($8 * floor((date_part('epoch', now()) + $9) / $8))
                    else null
                end
            )
            on conflict do nothing
        "#
    )
}

pub fn complete_job(schema: &str) -> String {
    let active = JobState::Active;
    let completed = JobState::Completed;

    formatdoc!(
        r#"
            update {schema}.job
                set state = '{completed}', completed_at = now()
                where id = $1
                    and state = '{active}'
        "#
    )
}

pub fn cancel_job(schema: &str) -> String {
    let created = JobState::Created;
    let retry = JobState::Retry;
    let active = JobState::Active;
    let expired = JobState::Expired;
    let cancelled = JobState::Cancelled;

    formatdoc!(
        r#"
            update {schema}.job
                set state = '{cancelled}', completed_at = now()
                where id = $1
                    and state in ('{created}', '{retry}', '{active}', '{expired}')
        "#
    )
}
