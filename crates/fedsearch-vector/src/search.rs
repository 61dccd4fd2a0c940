use async_trait::async_trait;
use arrow_array::{Array, Float32Array, RecordBatch, UInt64Array, FixedSizeListArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use fedsearch_core::{DocId, Error, IndexPage, Limit, Result, SimilarityIndex, SimilarityQuery, SimilarityTarget};

use crate::schema::{build_arrow_schema, vector_dim};
use crate::table::{ensure_table, open_db, remove_local_table};

/// LanceDB-backed similarity index over fixed-dimension content vectors.
///
/// With a target, matches are ordered by ascending L2 distance; without one
/// they come back in storage order. The query filter is an SQL predicate over
/// the table's columns (`category`, `id`).
pub struct LanceSimilarityIndex { pub(crate) db: Connection, pub(crate) table_name: String, pub(crate) dim: i32 }

impl LanceSimilarityIndex {
	/// Creates an empty table, dropping any previous one with the same name.
	pub async fn create(db_path: &Path, table_name: &str, dim: i32) -> anyhow::Result<Self> {
		anyhow::ensure!(dim > 0, "vector dimension must be positive, got {}", dim);
		std::fs::create_dir_all(db_path)?;
		remove_local_table(db_path, table_name)?;
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		ensure_table(&db, table_name, build_arrow_schema(dim)).await?;
		info!("Created LanceDB table {} (dim {}) at {}", table_name, dim, db_path.display());
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	pub async fn open(db_uri: &str, table_name: &str) -> anyhow::Result<Self> {
		let db = open_db(db_uri).await?;
		let table = db.open_table(table_name).execute().await?;
		let schema = table.schema().await?;
		let dim = vector_dim(&schema).ok_or_else(|| anyhow::anyhow!("table '{}' has no vector column", table_name))?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	pub fn dim(&self) -> i32 { self.dim }

	pub async fn count(&self) -> anyhow::Result<usize> {
		Ok(self.table().await?.count_rows(None).await?)
	}

	async fn table(&self) -> Result<Table> {
		self.db.open_table(&self.table_name).execute().await.map_err(upstream)
	}

	async fn resolve_target(&self, table: &Table, target: &SimilarityTarget) -> Result<Vec<f32>> {
		match target {
			SimilarityTarget::Vector(v) => {
				if v.len() != self.dim as usize {
					return Err(Error::bad_input(format!("target vector has {} dimensions, index expects {}", v.len(), self.dim)));
				}
				Ok(v.clone())
			}
			SimilarityTarget::Document(id) => {
				let mut stream = table
					.query()
					.only_if(format!("id = {id}"))
					.select(Select::columns(&["vector"]))
					.limit(1)
					.execute()
					.await
					.map_err(upstream)?;
				while let Some(batch) = TryStreamExt::try_next(&mut stream).await.map_err(upstream)? {
					if batch.num_rows() == 0 { continue; }
					return stored_vector(&batch);
				}
				Err(Error::not_found(format!("similarity target document {id} does not exist")))
			}
		}
	}

	async fn search_page(&self, query: &SimilarityQuery, offset: usize, limit: Limit, restrict_to: Option<&[DocId]>) -> Result<IndexPage> {
		if restrict_to.is_some_and(|ids| ids.is_empty()) {
			return Ok(IndexPage::default());
		}
		let table = self.table().await?;
		let predicate = build_predicate(query.filter.as_deref(), restrict_to);
		let total = table.count_rows(predicate.clone()).await.map_err(classify)?;
		let wanted = match limit { Limit::All => total.saturating_sub(offset), Limit::Count(n) => n.min(total.saturating_sub(offset)) };
		if wanted == 0 {
			return Ok(IndexPage::new(vec![], total));
		}
		let batches: Vec<RecordBatch> = match &query.target {
			Some(target) => {
				let vector = self.resolve_target(&table, target).await?;
				let mut q = table
					.vector_search(vector)
					.map_err(classify)?
					.distance_type(DistanceType::L2)
					.select(Select::columns(&["id"]))
					.limit(offset + wanted);
				if let Some(p) = &predicate { q = q.only_if(p.clone()); }
				q.execute().await.map_err(classify)?.try_collect().await.map_err(upstream)?
			}
			None => {
				let mut q = table.query().select(Select::columns(&["id"])).offset(offset).limit(wanted);
				if let Some(p) = &predicate { q = q.only_if(p.clone()); }
				q.execute().await.map_err(classify)?.try_collect().await.map_err(upstream)?
			}
		};
		// vector search pages from the top, so the rows before `offset` are dropped here
		let skip = if query.target.is_some() { offset } else { 0 };
		let (ids, distances) = read_hits(&batches, skip)?;
		debug!(offset, returned = ids.len(), total, restricted = restrict_to.is_some(), "similarity page");
		Ok(IndexPage::new(ids, total).with_distances(distances))
	}
}

fn build_predicate(filter: Option<&str>, restrict_to: Option<&[DocId]>) -> Option<String> {
	let filter = filter.map(str::trim).filter(|f| !f.is_empty());
	let restriction = restrict_to.map(|ids| {
		let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
		format!("id IN ({})", list.join(", "))
	});
	match (filter, restriction) {
		(Some(f), Some(r)) => Some(format!("({f}) AND {r}")),
		(Some(f), None) => Some(f.to_string()),
		(None, r) => r,
	}
}

fn read_hits(batches: &[RecordBatch], skip: usize) -> Result<(Vec<DocId>, HashMap<DocId, f32>)> {
	let mut seen = 0usize;
	let mut ids = Vec::new();
	let mut distances = HashMap::new();
	for batch in batches {
		let id_col = batch
			.column_by_name("id")
			.and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
			.ok_or_else(|| Error::upstream("similarity index returned rows without an id column"))?;
		let distance_col = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
		for i in 0..batch.num_rows() {
			seen += 1;
			if seen <= skip { continue; }
			let id = id_col.value(i);
			ids.push(id);
			if let Some(d) = distance_col { distances.insert(id, d.value(i)); }
		}
	}
	Ok((ids, distances))
}

fn stored_vector(batch: &RecordBatch) -> Result<Vec<f32>> {
	let list = batch
		.column_by_name("vector")
		.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
		.ok_or_else(|| Error::upstream("similarity index returned rows without a vector column"))?;
	if list.is_null(0) {
		return Err(Error::not_found("similarity target document has no vector"));
	}
	let values = list.value(0);
	let floats = values
		.as_any()
		.downcast_ref::<Float32Array>()
		.ok_or_else(|| Error::upstream("similarity index vector column is not float32"))?;
	Ok(floats.values().to_vec())
}

fn upstream(e: lancedb::Error) -> Error {
	Error::upstream(format!("similarity index: {e}"))
}

/// Malformed predicates surface as invalid input; anything else is the back-end's fault.
fn classify(e: lancedb::Error) -> Error {
	match e {
		lancedb::Error::InvalidInput { message } => Error::bad_input(format!("invalid similarity query: {message}")),
		other => upstream(other),
	}
}

#[async_trait]
impl SimilarityIndex for LanceSimilarityIndex {
	async fn page(&self, query: &SimilarityQuery, offset: usize, limit: Limit, restrict_to: Option<&[DocId]>) -> Result<IndexPage> {
		self.search_page(query, offset, limit, restrict_to).await
	}

	async fn snapshot(&self) -> Result<Option<u64>> {
		Ok(Some(self.table().await?.version().await.map_err(upstream)?))
	}
}

#[cfg(test)]
mod tests {
	use super::build_predicate;

	#[test]
	fn predicate_combines_filter_and_restriction() {
		assert_eq!(build_predicate(None, None), None);
		assert_eq!(build_predicate(Some("  "), None), None);
		assert_eq!(build_predicate(Some("category = '/a'"), None).as_deref(), Some("category = '/a'"));
		assert_eq!(build_predicate(None, Some(&[3, 1])).as_deref(), Some("id IN (3, 1)"));
		assert_eq!(
			build_predicate(Some("category = '/a' OR id > 2"), Some(&[7])).as_deref(),
			Some("(category = '/a' OR id > 2) AND id IN (7)")
		);
	}
}
