use serde_json::json;

use crate::TriageService;
use triage_domain::{RetrievedContext, TicketRef, extract_ticket_refs, ticket_keys_in};

const CONTEXT_CAP: usize = 10;

/// The writer's product: the final answer plus the ticket references the
/// answer may cite.
#[derive(Clone, Debug)]
pub(crate) struct ComposedAnswer {
	pub answer: String,
	pub tickets: Vec<TicketRef>,
}

impl TriageService {
	/// Composes the final answer from the ranked contexts. An empty context
	/// list short-circuits to a deterministic no-results answer; a writer
	/// failure degrades to a deterministic fallback rather than erroring the
	/// request.
	pub(crate) async fn compose_answer(
		&self,
		query: &str,
		retrieval_method: &str,
		production_incident: bool,
		contexts: &[RetrievedContext],
	) -> ComposedAnswer {
		let capped = &contexts[..contexts.len().min(CONTEXT_CAP)];
		let mut tickets = extract_ticket_refs(capped);

		if capped.is_empty() {
			let answer = enforce_cited_keys(no_results_answer(query), &mut tickets, capped);

			return ComposedAnswer { answer, tickets };
		}

		let style = if production_incident {
			"This is a production incident: lead with the most actionable item and skip \
				background discussion."
		} else {
			"Answer thoroughly but stay concise; include background only where it helps."
		};
		let messages = vec![
			json!({
				"role": "system",
				"content": format!(
					"You write final answers for a ticket retrieval system. Cite tickets by \
					their keys (the bracketed identifiers in the context). Never invent ticket \
					identifiers that do not appear in the context. {style}"
				),
			}),
			json!({
				"role": "user",
				"content": format!(
					"Query: {query}\nRetrieval method: {retrieval_method}\n\nRetrieved context:\n{}",
					format_context_block(capped)
				),
			}),
		];

		let answer = match self
			.providers
			.llm
			.complete_text(&self.cfg.providers.llm_strong, &messages)
			.await
		{
			Ok(text) => text.trim().to_string(),
			Err(err) => {
				tracing::warn!(error = %err, "Response writer failed; using the fallback answer.");

				fallback_answer(query, production_incident, &tickets)
			},
		};
		let answer = enforce_cited_keys(answer, &mut tickets, contexts);

		ComposedAnswer { answer, tickets }
	}
}

/// Every key cited in the answer must appear in the reference list. A cited
/// key backed by a retrieved context is appended; one backed by nothing is
/// stripped from the prose.
pub(crate) fn enforce_cited_keys(
	mut answer: String,
	tickets: &mut Vec<TicketRef>,
	contexts: &[RetrievedContext],
) -> String {
	for key in ticket_keys_in(&answer) {
		if tickets.iter().any(|ticket| ticket.key == key) {
			continue;
		}

		match contexts.iter().find(|context| context.metadata_str("key") == Some(key.as_str())) {
			Some(context) => {
				let title = context
					.metadata_str("title")
					.map(str::to_string)
					.unwrap_or_else(|| "No title available".to_string());

				tickets.push(TicketRef { key: key.clone(), title });
			},
			None => {
				tracing::warn!(key = %key, "Stripping a cited ticket absent from every context.");

				answer = answer.replace(&key, "an unverified ticket");
			},
		}
	}

	answer
}

/// Deterministic answer for the empty-result case: state it plainly and
/// offer reformulations instead of inventing tickets.
pub(crate) fn no_results_answer(query: &str) -> String {
	format!(
		"No relevant information was found for \"{query}\". Try one of these reformulations:\n\
		- add the exact error message or exception name\n\
		- include the affected component or project name\n\
		- reference a specific ticket key if you have one"
	)
}

pub(crate) fn fallback_answer(
	query: &str,
	production_incident: bool,
	tickets: &[TicketRef],
) -> String {
	let cited = tickets
		.iter()
		.take(3)
		.map(|ticket| format!("{} ({})", ticket.key, ticket.title))
		.collect::<Vec<_>>()
		.join(", ");

	if production_incident {
		if cited.is_empty() {
			return format!(
				"Response generation is unavailable for the incident query \"{query}\". Check \
				the retrieved contexts directly and escalate if the incident persists."
			);
		}

		return format!(
			"Response generation is unavailable. Start with these tickets, most relevant \
			first: {cited}."
		);
	}

	if cited.is_empty() {
		return format!(
			"Response generation is unavailable for \"{query}\". Please retry or rephrase the \
			question."
		);
	}

	format!("Response generation is unavailable. The most relevant tickets found were: {cited}.")
}

fn format_context_block(contexts: &[RetrievedContext]) -> String {
	let mut parts = Vec::with_capacity(contexts.len());

	for (index, context) in contexts.iter().enumerate() {
		if context.content.trim().is_empty() {
			continue;
		}

		let key = context
			.metadata_str("key")
			.map(str::to_string)
			.unwrap_or_else(|| format!("DOC-{}", index + 1));

		parts.push(format!("[{key}] {}", context.content));
	}

	if parts.is_empty() {
		return "No relevant context with valid content found.".to_string();
	}

	parts.join("\n\n")
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn context_block_labels_entries_by_ticket_key() {
		let mut with_key = RetrievedContext::new("Title: A\nDescription: B", "bm25_bugs", 0.9);

		with_key.metadata.insert("key".to_string(), json!("HBASE-1"));

		let without_key = RetrievedContext::new("Title: C", "web_tavily", 0.5);
		let block = format_context_block(&[with_key, without_key]);

		assert!(block.starts_with("[HBASE-1] Title: A"));
		assert!(block.contains("[DOC-2] Title: C"));
	}

	#[test]
	fn no_results_answer_suggests_reformulations() {
		let answer = no_results_answer("mystery failure");

		assert!(answer.contains("No relevant information"));
		assert_eq!(answer.lines().filter(|line| line.starts_with('-')).count(), 3);
	}

	#[test]
	fn cited_keys_backed_by_a_context_are_appended() {
		let mut context = RetrievedContext::new("Title: Flush storm", "compression_bugs", 0.7);

		context.metadata.insert("key".to_string(), json!("HBASE-44"));
		context.metadata.insert("title".to_string(), json!("Flush storm"));

		let mut tickets = Vec::new();
		let answer = enforce_cited_keys(
			"HBASE-44 describes the same flush storm.".to_string(),
			&mut tickets,
			&[context],
		);

		assert!(answer.contains("HBASE-44"));
		assert_eq!(tickets, vec![TicketRef { key: "HBASE-44".to_string(), title: "Flush storm".to_string() }]);
	}

	#[test]
	fn unbacked_citations_are_stripped_from_the_prose() {
		let mut tickets = Vec::new();
		let answer = enforce_cited_keys(
			"See FAKE-999 for details; FAKE-999 is the root cause.".to_string(),
			&mut tickets,
			&[],
		);

		assert!(!answer.contains("FAKE-999"));
		assert!(answer.contains("an unverified ticket"));
		assert!(tickets.is_empty());
	}

	#[test]
	fn incident_fallback_leads_with_tickets() {
		let tickets = vec![TicketRef { key: "SPR-1".to_string(), title: "Boot failure".to_string() }];
		let answer = fallback_answer("users cannot log in", true, &tickets);

		assert!(answer.contains("SPR-1"));
		assert!(answer.contains("most relevant first"));
	}
}
