use time::OffsetDateTime;

/// The two logically identical ticket collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
	Bugs,
	Releases,
}
impl Collection {
	pub const ALL: [Self; 2] = [Self::Bugs, Self::Releases];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Bugs => "bugs",
			Self::Releases => "releases",
		}
	}

	pub fn table_name(self) -> &'static str {
		self.as_str()
	}
}

/// One ticket record as stored in the relational back-end.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct TicketRow {
	pub jira_id: i64,
	pub key: String,
	pub project: Option<String>,
	pub project_name: Option<String>,
	pub priority: Option<String>,
	pub r#type: Option<String>,
	pub status: Option<String>,
	pub component: Option<String>,
	pub version: Option<String>,
	pub reporter: Option<String>,
	pub assignee: Option<String>,
	pub created: Option<OffsetDateTime>,
	pub resolved: Option<OffsetDateTime>,
	pub updated: Option<OffsetDateTime>,
	pub title: String,
	pub description: Option<String>,
	pub content: Option<String>,
}

/// A ticket row paired with the raw score the producing query assigned.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ScoredTicketRow {
	#[sqlx(flatten)]
	pub ticket: TicketRow,
	pub score: f32,
}

/// A ticket row paired with its embedding rendered as vector text, used by
/// the client-side scoring fallback.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct TicketVectorRow {
	#[sqlx(flatten)]
	pub ticket: TicketRow,
	pub vec_text: Option<String>,
}

/// Structured equality filters accepted by every search operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketFilters {
	pub project: Option<String>,
	pub ticket_type: Option<String>,
	pub status: Option<String>,
	pub priority: Option<String>,
}
impl TicketFilters {
	pub fn is_empty(&self) -> bool {
		self.pairs().is_empty()
	}

	/// Column/value pairs for the filters that are set.
	pub fn pairs(&self) -> Vec<(&'static str, &str)> {
		let mut out = Vec::new();

		if let Some(project) = self.project.as_deref() {
			out.push(("project", project));
		}
		if let Some(ticket_type) = self.ticket_type.as_deref() {
			out.push(("type", ticket_type));
		}
		if let Some(status) = self.status.as_deref() {
			out.push(("status", status));
		}
		if let Some(priority) = self.priority.as_deref() {
			out.push(("priority", priority));
		}

		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filters_enumerate_only_set_fields() {
		let filters = TicketFilters {
			project: Some("HBASE".to_string()),
			status: Some("Open".to_string()),
			..TicketFilters::default()
		};

		assert_eq!(filters.pairs(), vec![("project", "HBASE"), ("status", "Open")]);
		assert!(!filters.is_empty());
		assert!(TicketFilters::default().is_empty());
	}
}
