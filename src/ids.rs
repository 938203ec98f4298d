use rand::RngCore;
use uuid::Uuid;

/// Which UUID variant the factory produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdKind {
    /// Time-ordered v1 ids, friendlier to btree inserts
    #[default]
    V1,
    /// Random v4 ids
    V4,
}

/// Generates job ids.
///
/// V1 ids share one random node id per factory so ids from a single
/// process sort by creation time.
#[derive(Debug, Clone)]
pub struct IdFactory {
    kind: IdKind,
    node_id: [u8; 6],
}

impl IdFactory {
    pub fn new(kind: IdKind) -> Self {
        let mut node_id = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut node_id);

        IdFactory { kind, node_id }
    }

    pub fn next(&self) -> Uuid {
        match self.kind {
            IdKind::V1 => Uuid::now_v1(&self.node_id),
            IdKind::V4 => Uuid::new_v4(),
        }
    }
}
