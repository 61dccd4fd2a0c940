use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use arrow_array::{RecordBatch, RecordBatchIterator, FixedSizeListArray, StringArray, UInt64Array};
use std::sync::Arc;
use tracing::{info, warn};

use fedsearch_core::Document;

use crate::schema::build_arrow_schema;
use crate::search::LanceSimilarityIndex;

const BATCH_SIZE: usize = 1000;

impl LanceSimilarityIndex {
	/// Appends every document that carries a vector; returns how many were written.
	pub async fn index_documents(&self, docs: &[Document]) -> Result<usize> {
		let with_vectors: Vec<&Document> = docs.iter().filter(|d| d.vector.is_some()).collect();
		if with_vectors.len() < docs.len() {
			warn!(skipped = docs.len() - with_vectors.len(), "documents without vectors are not added to the similarity index");
		}
		if with_vectors.is_empty() { info!("No vectors to index"); return Ok(0); }
		for d in &with_vectors {
			let len = d.vector.as_ref().map_or(0, Vec::len);
			if len != self.dim as usize {
				anyhow::bail!("document {} has a {}-dimensional vector, table '{}' expects {}", d.id, len, self.table_name, self.dim);
			}
		}
		info!("Indexing {} vectors into LanceDB table: {}", with_vectors.len(), self.table_name);
		let pb = ProgressBar::new(with_vectors.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} vectors ({percent}%) {msg}")?.progress_chars("#>-"));
		let table = self.db.open_table(&self.table_name).execute().await?;
		let mut processed = 0usize;
		for batch in with_vectors.chunks(BATCH_SIZE) {
			let record_batch = self.docs_to_record_batch(batch)?;
			let schema = record_batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
			table.add(reader).execute().await?;
			processed += batch.len();
			pb.set_position(processed as u64);
		}
		pb.finish_with_message("LanceDB indexing completed");
		info!("Successfully indexed {} vectors into LanceDB", processed);
		Ok(processed)
	}

	fn docs_to_record_batch(&self, docs: &[&Document]) -> Result<RecordBatch> {
		let mut ids = Vec::with_capacity(docs.len());
		let mut categories = Vec::with_capacity(docs.len());
		let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(docs.len());
		for d in docs {
			ids.push(d.id);
			categories.push(d.category.clone());
			vectors.push(d.vector.as_ref().map(|v| v.iter().map(|&x| Some(x)).collect()));
		}
		let record_batch = RecordBatch::try_new(build_arrow_schema(self.dim), vec![
			Arc::new(UInt64Array::from(ids)),
			Arc::new(StringArray::from(categories)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim)),
		])?;
		Ok(record_batch)
	}
}
