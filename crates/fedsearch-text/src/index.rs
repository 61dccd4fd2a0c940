use async_trait::async_trait;
use std::path::PathBuf;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermSetQuery};
use tantivy::schema::{Facet, Field, Value};
use tantivy::{doc, DocAddress, Index, IndexWriter, Order, Searcher, TantivyDocument, Term};
use tracing::{debug, info};

use fedsearch_core::{DocId, Document, Error, IndexPage, KeywordIndex, KeywordQuery, Result};

use crate::tantivy_utils::{build_schema, normalize_category, register_tokenizer};

/// Tantivy-backed keyword index.
///
/// Results are ordered by BM25 relevance when the query has text and by
/// ascending document ID otherwise. The filter expression narrows the match
/// set without affecting scores.
pub struct TantivyKeywordIndex {
	index: Index,
	id_field: Field,
	text_field: Field,
	category_field: Field,
	category_text_field: Field,
}

impl TantivyKeywordIndex {
	/// Creates a fresh index in `index_dir`, replacing whatever was there.
	pub fn create(index_dir: PathBuf) -> anyhow::Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(&index_dir)?; }
		std::fs::create_dir_all(&index_dir)?;
		Self::from_index(Index::create_in_dir(&index_dir, build_schema())?)
	}

	pub fn open(index_dir: PathBuf) -> anyhow::Result<Self> {
		Self::from_index(Index::open_in_dir(&index_dir)?)
	}

	pub fn in_ram() -> anyhow::Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> anyhow::Result<Self> {
		register_tokenizer(&index);
		let schema = index.schema();
		let id_field = schema.get_field("id")?;
		let text_field = schema.get_field("text")?;
		let category_field = schema.get_field("category")?;
		let category_text_field = schema.get_field("category_text")?;
		Ok(Self { index, id_field, text_field, category_field, category_text_field })
	}

	pub fn index_documents(&self, docs: &[Document]) -> anyhow::Result<usize> {
		// Single writer thread keeps one segment in insertion order.
		let mut index_writer: IndexWriter = self.index.writer_with_num_threads(1, 50_000_000)?;
		for d in docs {
			let category = normalize_category(&d.category);
			let facet = Facet::from_text(&category)
				.map_err(|e| anyhow::anyhow!("invalid category '{}': {:?}", category, e))?;
			index_writer.add_document(doc!(
				self.id_field => d.id,
				self.text_field => d.text.clone(),
				self.category_field => facet,
				self.category_text_field => category,
			))?;
		}
		index_writer.commit()?;
		info!(count = docs.len(), "indexed documents into tantivy");
		Ok(docs.len())
	}

	pub fn num_docs(&self) -> anyhow::Result<u64> {
		Ok(self.index.reader()?.searcher().num_docs())
	}

	fn build_query(&self, query: &KeywordQuery, restrict_to: Option<&[DocId]>) -> Result<Box<dyn Query>> {
		let parser = QueryParser::for_index(&self.index, vec![self.text_field, self.category_text_field]);
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		if let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) {
			let parsed = parser
				.parse_query(text)
				.map_err(|e| Error::bad_input(format!("invalid text query: {e}")))?;
			clauses.push((Occur::Must, parsed));
		}
		if let Some(filter) = query.filter.as_deref().filter(|f| !f.trim().is_empty()) {
			let parsed = parser
				.parse_query(filter)
				.map_err(|e| Error::bad_input(format!("invalid filter: {e}")))?;
			clauses.push((Occur::Must, Box::new(ConstScoreQuery::new(parsed, 0.0))));
		}
		if let Some(ids) = restrict_to {
			let terms = ids.iter().map(|id| Term::from_field_u64(self.id_field, *id));
			clauses.push((Occur::Must, Box::new(TermSetQuery::new(terms))));
		}
		if clauses.is_empty() {
			return Ok(Box::new(AllQuery));
		}
		Ok(Box::new(BooleanQuery::new(clauses)))
	}

	fn search_page(
		&self,
		query: &KeywordQuery,
		offset: usize,
		limit: usize,
		restrict_to: Option<&[DocId]>,
	) -> Result<IndexPage> {
		if restrict_to.is_some_and(|ids| ids.is_empty()) {
			return Ok(IndexPage::default());
		}
		let scored = query.text.as_deref().is_some_and(|t| !t.trim().is_empty());
		let q = self.build_query(query, restrict_to)?;
		let reader = self.index.reader().map_err(upstream)?;
		let searcher = reader.searcher();
		let total = searcher.search(&*q, &Count).map_err(upstream)?;
		if limit == 0 || offset >= total {
			return Ok(IndexPage::new(vec![], total));
		}
		let ids = if scored {
			let top_docs = searcher
				.search(&*q, &TopDocs::with_limit(limit).and_offset(offset))
				.map_err(upstream)?;
			top_docs
				.into_iter()
				.map(|(_score, addr)| self.stored_id(&searcher, addr))
				.collect::<Result<Vec<DocId>>>()?
		} else {
			let by_id = TopDocs::with_limit(limit).and_offset(offset).order_by_fast_field::<u64>("id", Order::Asc);
			searcher.search(&*q, &by_id).map_err(upstream)?.into_iter().map(|(id, _)| id).collect()
		};
		debug!(offset, limit, total, returned = ids.len(), restricted = restrict_to.is_some(), "keyword page");
		Ok(IndexPage::new(ids, total))
	}

	fn stored_id(&self, searcher: &Searcher, addr: DocAddress) -> Result<DocId> {
		let doc: TantivyDocument = searcher.doc(addr).map_err(upstream)?;
		doc.get_first(self.id_field)
			.and_then(|v| v.as_u64())
			.ok_or_else(|| Error::upstream("keyword index returned a document without id"))
	}
}

fn upstream(e: tantivy::TantivyError) -> Error {
	Error::upstream(format!("keyword index: {e}"))
}

#[async_trait]
impl KeywordIndex for TantivyKeywordIndex {
	async fn page(
		&self,
		query: &KeywordQuery,
		offset: usize,
		limit: usize,
		restrict_to: Option<&[DocId]>,
	) -> Result<IndexPage> {
		self.search_page(query, offset, limit, restrict_to)
	}
}
