use km_domain::Record;

use crate::{Result, SearchService};

impl SearchService {
	/// Stores `record` on `node_id` and indexes it in every index of that node.
	pub async fn put(&self, node_id: &str, record: &Record) -> Result<()> {
		self.node(node_id)?.put(record).await
	}

	pub async fn get(&self, node_id: &str, record_id: &str) -> Result<Option<Record>> {
		self.node(node_id)?.get(record_id).await
	}

	/// Returns whether a record was removed.
	pub async fn delete(&self, node_id: &str, record_id: &str) -> Result<bool> {
		self.node(node_id)?.delete(record_id).await
	}
}
