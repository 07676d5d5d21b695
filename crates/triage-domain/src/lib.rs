pub mod context;
pub mod routing;
pub mod tickets;

pub use context::{
	RetrievedContext, clamp_score, cmp_score_desc, content_hash, fuse, normalize_keyword_scores,
	topk, vector_similarity_score,
};
pub use routing::{RoutePlan, Strategy, has_ticket_key, route, rule_route};
pub use tickets::{TicketRef, extract_ticket_refs, ticket_keys_in};
