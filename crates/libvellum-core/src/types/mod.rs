pub mod ids;
pub mod snapshot;

pub use ids::{ActorId, EntryId, LineageId};
pub use ids::{generate_actor_id, hex_to_id, id_to_hex, parse_actor_id};
pub use snapshot::{Commit, Meta, Readme, Snapshot, Structure, Transform, Viz};
