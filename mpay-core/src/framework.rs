use sqlx::PgPool;

/// Executes database queries; each query type gets a
/// [`kanau::processor::Processor`] impl next to its entity.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
