//! `ContextInjector`: retrieves relevant knowledge atoms for enterprise
//! accounts and appends them to the system prompt. Retrieval failures are
//! swallowed — the base prompt is always usable on its own.

use rusqlite::params;

use crate::db::open_conn;
use crate::error::GatewayResult;

pub struct RetrieveOptions {
    pub max_results: usize,
    pub min_similarity: f64,
    pub boost_helpful: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self { max_results: 5, min_similarity: 0.4, boost_helpful: true }
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeAtom {
    pub id: String,
    pub content: String,
    pub similarity: f64,
    pub helpful_count: i64,
}

/// The core only ever calls through this trait; the shipped implementation
/// scores by naive lexical overlap rather than an embedding model, which is
/// explicitly an external collaborator concern.
pub trait KnowledgeStore: Send + Sync {
    fn retrieve(&self, user_id: &str, query: &str, opts: &RetrieveOptions) -> GatewayResult<Vec<KnowledgeAtom>>;
    fn record_usage(&self, atom_ids: &[String]) -> GatewayResult<()>;
}

pub struct LexicalKnowledgeStore;

impl LexicalKnowledgeStore {
    pub fn new() -> Self {
        LexicalKnowledgeStore
    }
}

impl Default for LexicalKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(s: &str) -> std::collections::HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Jaccard overlap between the query's tokens and the atom's tokens.
fn lexical_similarity(query_tokens: &std::collections::HashSet<String>, content: &str) -> f64 {
    let content_tokens = tokenize(content);
    if query_tokens.is_empty() || content_tokens.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens.intersection(&content_tokens).count();
    let union = query_tokens.union(&content_tokens).count();
    intersection as f64 / union as f64
}

impl KnowledgeStore for LexicalKnowledgeStore {
    fn retrieve(&self, user_id: &str, query: &str, opts: &RetrieveOptions) -> GatewayResult<Vec<KnowledgeAtom>> {
        let conn = open_conn();
        let mut stmt = conn.prepare(
            "select id, content, helpful_count from knowledge_atoms where user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
        })?;

        let query_tokens = tokenize(query);
        let mut scored: Vec<KnowledgeAtom> = rows
            .filter_map(|row| row.ok())
            .map(|(id, content, helpful_count)| {
                let similarity = lexical_similarity(&query_tokens, &content);
                KnowledgeAtom { id, content, similarity, helpful_count }
            })
            .filter(|atom| atom.similarity >= opts.min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            if opts.boost_helpful {
                (b.similarity, b.helpful_count)
                    .partial_cmp(&(a.similarity, a.helpful_count))
                    .unwrap_or(std::cmp::Ordering::Equal)
            } else {
                b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal)
            }
        });
        scored.truncate(opts.max_results);
        Ok(scored)
    }

    fn record_usage(&self, atom_ids: &[String]) -> GatewayResult<()> {
        if atom_ids.is_empty() {
            return Ok(());
        }
        let conn = open_conn();
        for id in atom_ids {
            conn.execute(
                "update knowledge_atoms set usage_count = usage_count + 1 where id = ?1",
                params![id],
            )?;
        }
        Ok(())
    }
}

/// Builds the final system prompt: the base prompt preserved verbatim,
/// with the retrieved atoms appended after a newline when any matched.
pub fn build_system_prompt(base_prompt: &str, atoms: &[KnowledgeAtom]) -> String {
    if atoms.is_empty() {
        return base_prompt.to_string();
    }
    let block = atoms
        .iter()
        .map(|a| format!("- {}", a.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{base_prompt}\n\nRelevant context:\n{block}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_atoms_leaves_prompt_unchanged() {
        assert_eq!(build_system_prompt("base", &[]), "base");
    }

    #[test]
    fn atoms_appended_after_newline() {
        let atoms = vec![KnowledgeAtom { id: "1".into(), content: "likes concise answers".into(), similarity: 0.8, helpful_count: 3 }];
        let prompt = build_system_prompt("base prompt", &atoms);
        assert!(prompt.starts_with("base prompt\n"));
        assert!(prompt.contains("likes concise answers"));
    }

    #[test]
    fn similarity_is_symmetric_jaccard() {
        let tokens = tokenize("the quick brown fox");
        let sim = lexical_similarity(&tokens, "the quick brown fox jumps");
        assert!(sim > 0.0 && sim < 1.0);
    }
}
