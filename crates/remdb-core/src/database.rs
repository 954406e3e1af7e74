//! The database facade.
//!
//! One handle per `(directory, tenant)` pair. All state lives under the
//! directory: `db/` holds the ordered KV data, `vector_index.hnsw` the ANN
//! snapshot. The handle owns the background worker; nothing here is
//! process-global.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embed::Embedder;
use crate::entity::{
    build_new, deterministic_id, merge_existing, take_aliases, take_inline_edges, ID_LIKE_FIELDS,
};
use crate::error::{DbError, Result};
use crate::exec::{plan, project, ExecStats, ExecStatsSnapshot, Plan};
use crate::graph::{GraphTraversal, TraversalPath, TraversalStrategy, TraverseOptions, DEFAULT_MAX_DEPTH};
use crate::index::{check_indexable, transition_ops, SecondaryIndex};
use crate::keys;
use crate::kv::{Store, WriteOp};
use crate::moment;
use crate::predicate::{paginate, sort_entities, Query};
use crate::schema::{Schema, SchemaRegistry, BUILTIN_SCHEMAS};
use crate::sql;
use crate::sql::SimilarityClause;
use crate::types::{Direction, Entity, Moment, StoredEdge, WalEntry};
use crate::vector::{VectorIndex, DEFAULT_CAPACITY};
use crate::wal::WalStore;
use crate::worker::{BackgroundWorker, Task, WorkerStatus};

/// Extension of the per-tenant ANN snapshot inside the database directory.
const VECTOR_SNAPSHOT_EXT: &str = "hnsw";

/// Default k for similarity queries without a LIMIT.
const DEFAULT_KNN_K: usize = 10;

/// Candidate multiplier when a knn result set is filtered down to one
/// schema afterwards.
const KNN_OVERFETCH: usize = 4;

type ReplicationSink = Box<dyn Fn(WalEntry) + Send + Sync>;

/// Open-time options.
pub struct DatabaseOptions {
    /// Vector dimension, fixed for the lifetime of the index.
    pub embedding_dim: usize,
    /// Initial ANN capacity; grows by rebuild when exhausted.
    pub vector_capacity: usize,
    /// Peer id stamped into WAL entries originated by this handle.
    pub peer_id: String,
    /// Embedding collaborator; may also be bound later.
    pub embedder: Option<Arc<dyn Embedder>>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            embedding_dim: 384,
            vector_capacity: DEFAULT_CAPACITY,
            peer_id: "local".to_string(),
            embedder: None,
        }
    }
}

pub(crate) struct DatabaseInner {
    store: Store,
    tenant: String,
    path: PathBuf,
    registry: SchemaRegistry,
    wal: WalStore,
    vectors: VectorIndex,
    worker: BackgroundWorker,
    embedder: RwLock<Option<Arc<dyn Embedder>>>,
    stats: ExecStats,
    replication_sink: Mutex<Option<ReplicationSink>>,
}

/// Embedded multi-tenant knowledge store handle.
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open the database at `path` for one tenant, with defaults.
    pub fn open(path: impl AsRef<Path>, tenant: &str) -> Result<Self> {
        Self::open_with_options(path, tenant, DatabaseOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        tenant: &str,
        options: DatabaseOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(path.join("db"))?;

        let store = Store::open(&path.join("db"))?;
        let wal = WalStore::open(store.clone(), tenant, &options.peer_id)?;
        let registry = SchemaRegistry::new();
        let vectors = VectorIndex::new(options.embedding_dim, options.vector_capacity);

        let inner = Arc::new_cyclic(|weak: &Weak<DatabaseInner>| {
            let weak = weak.clone();
            let worker = BackgroundWorker::start(move |task| match weak.upgrade() {
                Some(inner) => inner.handle_task(task),
                None => Ok(()),
            });
            DatabaseInner {
                store,
                tenant: tenant.to_string(),
                path,
                registry,
                wal,
                vectors,
                worker,
                embedder: RwLock::new(options.embedder),
                stats: ExecStats::default(),
                replication_sink: Mutex::new(None),
            }
        });

        inner.load_schemas()?;
        let db = Self { inner };
        for (name, definition) in BUILTIN_SCHEMAS.iter() {
            db.register_schema(name, definition.clone())?;
        }
        db.inner.restore_vectors()?;
        info!(
            tenant,
            seq = db.inner.wal.current_seq(),
            vectors = db.inner.vectors.len(),
            "database open"
        );
        Ok(db)
    }

    pub fn tenant(&self) -> &str {
        &self.inner.tenant
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Bind (or replace) the embedding collaborator.
    pub fn set_embedder(&self, embedder: Arc<dyn Embedder>) {
        *self.inner.embedder.write() = Some(embedder);
    }

    /// Register a push sink for WAL entries; the replication leader uses
    /// this to feed live streams without polling.
    pub fn set_replication_sink<F>(&self, sink: F)
    where
        F: Fn(WalEntry) + Send + Sync + 'static,
    {
        *self.inner.replication_sink.lock() = Some(Box::new(sink));
    }

    pub fn clear_replication_sink(&self) {
        *self.inner.replication_sink.lock() = None;
    }

    // ------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------

    /// Register a schema. Identical re-registration is idempotent; an
    /// incompatible one fails with `DuplicateSchema`.
    pub fn register_schema(&self, name: &str, definition: Value) -> Result<Arc<Schema>> {
        let schema = Schema::from_value(name, definition)?;
        if let Some(existing) = self.inner.registry.check_compatible(&schema)? {
            return Ok(existing);
        }
        let row = WriteOp::put(
            keys::schema(&self.inner.tenant, name),
            serde_json::to_vec(&schema)?,
        );
        let entries = self.inner.wal.append_batch(vec![row])?;
        self.inner.dispatch_replication(entries);
        debug!(schema = name, "schema registered");
        Ok(self.inner.registry.install(schema))
    }

    pub fn get_schema(&self, name: &str) -> Option<Arc<Schema>> {
        self.inner.registry.get(name)
    }

    pub fn list_schemas(&self) -> Vec<String> {
        self.inner.registry.list()
    }

    pub fn list_schemas_by_category(&self, category: &str) -> Vec<String> {
        self.inner.registry.list_by_category(category)
    }

    pub fn schema_categories(&self) -> Vec<String> {
        self.inner.registry.categories()
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Validate and write one row; key-field schemas upsert with merge.
    pub fn insert(&self, schema_name: &str, data: Value) -> Result<Uuid> {
        self.inner.insert(schema_name, data)
    }

    /// Insert many rows of one schema, validating all payloads up front.
    pub fn insert_many(&self, schema_name: &str, rows: Vec<Value>) -> Result<Vec<Uuid>> {
        let schema = self
            .inner
            .registry
            .get(schema_name)
            .ok_or_else(|| DbError::UnknownSchema(schema_name.to_string()))?;
        for row in &rows {
            let obj = as_object(row)?;
            schema.validate(obj)?;
        }
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(self.inner.insert(schema_name, row)?);
        }
        Ok(ids)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Entity>> {
        self.inner.get_entity(id)
    }

    /// Delete a row with everything derived from it: index postings, alias
    /// rows, edges in both directions, the vector handle.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.inner.delete_entity(id)
    }

    /// Global lookup by id, name, alias, or a recognized id-like property.
    pub fn lookup(&self, identifier: &str) -> Result<Vec<Entity>> {
        self.inner.lookup(identifier)
    }

    /// All rows of one schema (full prefix scan).
    pub fn entities(&self, schema_name: &str) -> Result<Vec<Entity>> {
        Ok(self
            .inner
            .scan_entities()?
            .into_iter()
            .filter(|e| e.schema == schema_name)
            .collect())
    }

    /// Programmatic predicate query over one schema.
    pub fn query_entities(&self, schema_name: &str, query: Query) -> Result<Vec<Entity>> {
        let schema = self
            .inner
            .registry
            .get(schema_name)
            .ok_or_else(|| DbError::UnknownSchema(schema_name.to_string()))?;
        self.inner.run_query(&schema, query)
    }

    // ------------------------------------------------------------------
    // SQL
    // ------------------------------------------------------------------

    /// Parse and execute one SELECT statement.
    pub fn sql(&self, text: &str) -> Result<Vec<Value>> {
        let statement = sql::parse(text)?;
        let schema = self
            .inner
            .registry
            .get(&statement.table)
            .ok_or_else(|| DbError::UnknownSchema(statement.table.clone()))?;

        if let Some(similarity) = &statement.similarity {
            return self.inner.run_similarity(&schema, similarity, &statement);
        }

        let query = Query {
            predicate: statement.predicate.clone(),
            order_by: statement.order_by.clone(),
            limit: statement.limit,
            offset: statement.offset,
        };
        let rows = self.inner.run_query(&schema, query)?;
        Ok(rows
            .iter()
            .map(|e| project(e, statement.projection.as_deref(), None))
            .collect())
    }

    // ------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------

    /// Create a typed edge between two existing entities.
    pub fn create_edge(
        &self,
        src: Uuid,
        dst: Uuid,
        rel_type: &str,
        properties: Map<String, Value>,
    ) -> Result<()> {
        self.inner.create_edge(src, dst, rel_type, properties)
    }

    pub fn get_edges(&self, id: Uuid, direction: Direction) -> Result<Vec<StoredEdge>> {
        self.inner.get_edges(id, direction)
    }

    /// Bounded traversal from `start` over outgoing edges.
    pub fn traverse(&self, start: Uuid, options: TraverseOptions) -> Result<Vec<TraversalPath>> {
        let traversal = GraphTraversal::new(options.max_depth.unwrap_or(DEFAULT_MAX_DEPTH));
        let neighbors = |id: Uuid| self.inner.edges_out(id);
        traversal.traverse(
            start,
            &neighbors,
            options.strategy.unwrap_or(TraversalStrategy::Bfs),
            options.rel_filter.as_deref(),
            options.target,
        )
    }

    pub fn shortest_path(&self, src: Uuid, dst: Uuid) -> Result<Option<TraversalPath>> {
        let traversal = GraphTraversal::new(DEFAULT_MAX_DEPTH);
        let neighbors = |id: Uuid| self.inner.edges_out(id);
        traversal.shortest_path(src, dst, &neighbors, None)
    }

    pub fn all_paths(&self, src: Uuid, dst: Uuid, max_depth: usize) -> Result<Vec<TraversalPath>> {
        let traversal = GraphTraversal::new(max_depth);
        let neighbors = |id: Uuid| self.inner.edges_out(id);
        traversal.all_paths(src, dst, &neighbors, None)
    }

    // ------------------------------------------------------------------
    // Vectors
    // ------------------------------------------------------------------

    /// Attach an embedding to an entity. The write is durable (entity row +
    /// vector map) before the in-memory index picks it up; snapshot
    /// persistence happens on the background worker.
    pub fn set_embedding(&self, id: Uuid, vector: Vec<f32>) -> Result<()> {
        self.inner.set_embedding(id, vector)
    }

    pub fn delete_embedding(&self, id: Uuid) -> Result<()> {
        self.inner.delete_embedding(id)
    }

    /// Top-k entities by cosine similarity.
    pub fn search_similar(
        &self,
        query: &[f32],
        k: usize,
        min_score: f32,
    ) -> Result<Vec<(Entity, f32)>> {
        self.inner.search_similar(query, k, min_score, None)
    }

    /// Hybrid search: knn candidates, then the predicate as post-filter.
    /// The result is always a subset of `search_similar(query, k)`.
    pub fn search_hybrid(
        &self,
        query: &[f32],
        predicate: &crate::predicate::Predicate,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<(Entity, f32)>> {
        let candidates = self.inner.search_similar(query, k, min_score, None)?;
        Ok(candidates
            .into_iter()
            .filter(|(entity, _)| predicate.evaluate(entity))
            .collect())
    }

    // ------------------------------------------------------------------
    // Moments
    // ------------------------------------------------------------------

    pub fn create_moment(&self, moment: &Moment) -> Result<()> {
        let ops = moment::put_ops(&self.inner.tenant, moment)?;
        let entries = self.inner.wal.append_batch(ops)?;
        self.inner.dispatch_replication(entries);
        Ok(())
    }

    pub fn get_moment(&self, id: Uuid) -> Result<Option<Moment>> {
        moment::get(&self.inner.store, &self.inner.tenant, id)
    }

    pub fn list_moments(&self) -> Result<Vec<Moment>> {
        moment::list(&self.inner.store, &self.inner.tenant)
    }

    pub fn moments_between(
        &self,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Moment>> {
        moment::between(&self.inner.store, &self.inner.tenant, start, end)
    }

    // ------------------------------------------------------------------
    // WAL & replication
    // ------------------------------------------------------------------

    pub fn current_seq(&self) -> u64 {
        self.inner.wal.current_seq()
    }

    pub fn wal_range(
        &self,
        start_exclusive: u64,
        end_inclusive: Option<u64>,
        limit: usize,
    ) -> Result<Vec<WalEntry>> {
        self.inner.wal.range(start_exclusive, end_inclusive, limit)
    }

    /// Idempotent follower-side apply. Entries at or below the persisted
    /// watermark for their source peer are refused (returns `false`).
    pub fn apply_replicated(&self, entry: &WalEntry) -> Result<bool> {
        self.inner.apply_replicated(entry)
    }

    pub fn follower_watermark(&self, peer_id: &str) -> Result<u64> {
        self.inner.follower_watermark(peer_id)
    }

    // ------------------------------------------------------------------
    // Worker & lifecycle
    // ------------------------------------------------------------------

    pub fn worker_status(&self) -> WorkerStatus {
        self.inner.worker.status()
    }

    pub fn worker_queue_len(&self) -> usize {
        self.inner.worker.queue_len()
    }

    pub fn worker_last_error(&self) -> Option<String> {
        self.inner.worker.last_error()
    }

    /// Block until background tasks drain or the timeout expires.
    pub fn wait_for_worker(&self, timeout: Duration) -> bool {
        self.inner.worker.wait_idle(timeout)
    }

    /// Execution-path counters (index vs. scan vs. vector), for tests and
    /// diagnostics.
    pub fn exec_stats(&self) -> ExecStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Stop the worker and persist a final vector snapshot.
    pub fn close(&self, timeout: Duration) {
        self.inner.worker.wait_idle(timeout);
        self.inner.worker.stop(timeout);
        if let Err(err) = self.inner.save_vector_snapshot() {
            warn!("final vector snapshot failed: {err}");
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close(Duration::from_secs(5));
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| DbError::validation("payload", "expected a JSON object"))
}

impl DatabaseInner {
    // -- open-time helpers ---------------------------------------------

    fn load_schemas(&self) -> Result<()> {
        for bytes in self
            .store
            .scan_prefix_values(&keys::schema_prefix(&self.tenant))?
        {
            let schema: Schema = serde_json::from_slice(&bytes)?;
            self.registry.install(schema);
        }
        Ok(())
    }

    /// Restore the ANN index: snapshot when present and compatible, else a
    /// rebuild from the vector map plus the embeddings on entity rows.
    fn snapshot_path(&self) -> PathBuf {
        self.path
            .join(format!("vector_index.{}.{VECTOR_SNAPSHOT_EXT}", self.tenant))
    }

    fn restore_vectors(&self) -> Result<()> {
        let snapshot_path = self.snapshot_path();
        if let Some(count) = self.vectors.load_snapshot(&snapshot_path)? {
            debug!(count, "vector snapshot restored");
            return Ok(());
        }
        let mut restored = 0usize;
        for (key, value) in self
            .store
            .scan_prefix(&keys::vector_map_handle_prefix(&self.tenant))?
        {
            let mapping: Value = serde_json::from_slice(&value)?;
            let Some(entity_id) = mapping
                .get("entity_id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Uuid>().ok())
            else {
                continue;
            };
            let Some(handle) = String::from_utf8_lossy(&key)
                .rsplit(':')
                .next()
                .and_then(|h| h.parse::<u32>().ok())
            else {
                continue;
            };
            if let Some(entity) = self.get_entity(entity_id)? {
                if let Some(embedding) = &entity.embedding {
                    self.vectors.add(handle, embedding)?;
                    restored += 1;
                }
            }
        }
        if restored > 0 {
            debug!(restored, "vector index rebuilt from stored embeddings");
            self.worker.submit(Task::SaveIndex);
        }
        Ok(())
    }

    // -- background tasks ----------------------------------------------

    fn handle_task(&self, task: Task) -> Result<()> {
        match task {
            Task::SaveIndex => self.save_vector_snapshot(),
            Task::GenerateEmbedding { entity_id, text } => {
                let embedder = self.embedder.read().clone();
                let Some(embedder) = embedder else {
                    return Ok(());
                };
                let vector = embedder.embed(&text)?;
                // The entity may have been deleted while the task waited.
                if self.get_entity(entity_id)?.is_some() {
                    self.set_embedding(entity_id, vector)?;
                }
                Ok(())
            }
            Task::Replicate { entry } => {
                if let Some(sink) = self.replication_sink.lock().as_ref() {
                    sink(entry);
                }
                Ok(())
            }
        }
    }

    fn save_vector_snapshot(&self) -> Result<()> {
        self.vectors.save_snapshot(&self.snapshot_path())
    }

    fn dispatch_replication(&self, entries: Vec<WalEntry>) {
        if self.replication_sink.lock().is_none() {
            return;
        }
        for entry in entries {
            self.worker.submit(Task::Replicate { entry });
        }
    }

    // -- entities -------------------------------------------------------

    fn insert(&self, schema_name: &str, data: Value) -> Result<Uuid> {
        let schema = self
            .registry
            .get(schema_name)
            .ok_or_else(|| DbError::UnknownSchema(schema_name.to_string()))?;
        let payload = as_object(&data)?;
        let mut validated = schema.validate(payload)?;

        for field in &schema.indexed_fields {
            if let Some(value) = validated.get(field.as_str()) {
                check_indexable(field, value)?;
            }
        }

        let inline_edges = take_inline_edges(&mut validated)?;
        let aliases = take_aliases(&mut validated)?;

        let now = chrono::Utc::now();
        let id = match schema
            .key_field
            .as_ref()
            .and_then(|kf| validated.get(kf.as_str()))
        {
            Some(key_value) => deterministic_id(&self.tenant, schema_name, key_value),
            None => Uuid::new_v4(),
        };

        let existing = self.get_entity(id)?;
        let old_properties = existing.as_ref().map(|e| e.properties.clone());
        let entity = match existing {
            Some(existing) => merge_existing(existing, validated, aliases, now),
            None => build_new(id, schema_name, validated, aliases, now),
        };

        let mut ops = Vec::new();
        ops.push(WriteOp::put(
            keys::entity(&self.tenant, id),
            serde_json::to_vec(&entity)?,
        ));

        let index = SecondaryIndex::new(&self.store, &self.tenant, schema_name);
        ops.extend(transition_ops(
            &index,
            &schema.indexed_fields,
            id,
            old_properties.as_ref(),
            Some(&entity.properties),
        )?);

        for alias in &entity.aliases {
            ops.push(WriteOp::put(
                keys::alias(&self.tenant, alias),
                serde_json::to_vec(&json!({ "entity_id": id }))?,
            ));
        }

        for edge in inline_edges {
            let edge = edge.materialize(id, now);
            ops.push(WriteOp::put(
                keys::edge(&self.tenant, edge.src_id, edge.dst_id, &edge.rel_type),
                serde_json::to_vec(&edge)?,
            ));
        }

        let entries = self.wal.append_batch(ops)?;
        self.dispatch_replication(entries);

        // Auto-embedding: content-bearing payloads get a vector generated
        // on the worker once a provider is bound.
        if self.embedder.read().is_some() && entity.embedding.is_none() {
            let text = entity
                .properties
                .get("content")
                .or_else(|| entity.properties.get("description"))
                .and_then(Value::as_str);
            if let Some(text) = text {
                self.worker.submit(Task::GenerateEmbedding {
                    entity_id: id,
                    text: text.to_string(),
                });
            }
        }

        debug!(schema = schema_name, %id, "entity written");
        Ok(id)
    }

    fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        match self.store.get(&keys::entity(&self.tenant, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_entities(&self) -> Result<Vec<Entity>> {
        let mut out = Vec::new();
        for bytes in self
            .store
            .scan_prefix_values(&keys::entity_prefix(&self.tenant))?
        {
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    fn delete_entity(&self, id: Uuid) -> Result<()> {
        let Some(entity) = self.get_entity(id)? else {
            return Ok(());
        };

        let mut ops = vec![WriteOp::delete(keys::entity(&self.tenant, id))];

        if let Some(schema) = self.registry.get(&entity.schema) {
            let index = SecondaryIndex::new(&self.store, &self.tenant, &entity.schema);
            ops.extend(transition_ops(
                &index,
                &schema.indexed_fields,
                id,
                Some(&entity.properties),
                None,
            )?);
        }

        for alias in &entity.aliases {
            ops.push(WriteOp::delete(keys::alias(&self.tenant, alias)));
        }

        // Edges in both directions disappear with their endpoint.
        for edge in self.edges_out(id)? {
            ops.push(WriteOp::delete(keys::edge(
                &self.tenant,
                edge.src_id,
                edge.dst_id,
                &edge.rel_type,
            )));
        }
        for edge in self.all_edges()? {
            if edge.dst_id == id {
                ops.push(WriteOp::delete(keys::edge(
                    &self.tenant,
                    edge.src_id,
                    edge.dst_id,
                    &edge.rel_type,
                )));
            }
        }

        let mut forgotten_handle = None;
        if let Some(handle) = self.vector_handle(id)? {
            ops.push(WriteOp::delete(keys::vector_map_handle(&self.tenant, handle)));
            ops.push(WriteOp::delete(keys::vector_map_id(&self.tenant, id)));
            forgotten_handle = Some(handle);
        }

        let entries = self.wal.append_batch(ops)?;
        self.dispatch_replication(entries);

        if let Some(handle) = forgotten_handle {
            self.vectors.forget(handle);
            self.worker.submit(Task::SaveIndex);
        }
        debug!(%id, "entity deleted");
        Ok(())
    }

    fn lookup(&self, identifier: &str) -> Result<Vec<Entity>> {
        if let Ok(id) = identifier.parse::<Uuid>() {
            return Ok(self.get_entity(id)?.into_iter().collect());
        }

        let mut results = Vec::new();
        let mut seen = std::collections::HashSet::new();

        // Alias fast path.
        if let Some(bytes) = self.store.get(&keys::alias(&self.tenant, identifier))? {
            let mapping: Value = serde_json::from_slice(&bytes)?;
            if let Some(id) = mapping
                .get("entity_id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Uuid>().ok())
            {
                if let Some(entity) = self.get_entity(id)? {
                    seen.insert(entity.id);
                    results.push(entity);
                }
            }
        }

        // Scan for name and id-like property matches; produces the same
        // result set the pure-scan fallback would.
        let needle = identifier.to_lowercase();
        for entity in self.scan_entities()? {
            if seen.contains(&entity.id) {
                continue;
            }
            let name_hit = entity.name.to_lowercase() == needle;
            let alias_hit = entity
                .aliases
                .iter()
                .any(|a| a == identifier || a.to_lowercase() == needle);
            let prop_hit = ID_LIKE_FIELDS.iter().any(|field| {
                entity
                    .properties
                    .get(*field)
                    .map(|v| match v {
                        Value::String(s) => s == identifier,
                        other => other.to_string() == identifier,
                    })
                    .unwrap_or(false)
            });
            if name_hit || alias_hit || prop_hit {
                seen.insert(entity.id);
                results.push(entity);
            }
        }
        Ok(results)
    }

    // -- graph ----------------------------------------------------------

    fn create_edge(
        &self,
        src: Uuid,
        dst: Uuid,
        rel_type: &str,
        properties: Map<String, Value>,
    ) -> Result<()> {
        if self.get_entity(src)?.is_none() {
            return Err(DbError::UnknownEntity(src));
        }
        if self.get_entity(dst)?.is_none() {
            return Err(DbError::UnknownEntity(dst));
        }
        let edge = StoredEdge {
            src_id: src,
            dst_id: dst,
            rel_type: rel_type.to_string(),
            properties,
            created_at: chrono::Utc::now(),
        };
        let op = WriteOp::put(
            keys::edge(&self.tenant, src, dst, rel_type),
            serde_json::to_vec(&edge)?,
        );
        let entries = self.wal.append_batch(vec![op])?;
        self.dispatch_replication(entries);
        Ok(())
    }

    fn edges_out(&self, id: Uuid) -> Result<Vec<StoredEdge>> {
        let mut out = Vec::new();
        for bytes in self
            .store
            .scan_prefix_values(&keys::edge_out_prefix(&self.tenant, id))?
        {
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    fn all_edges(&self) -> Result<Vec<StoredEdge>> {
        let mut out = Vec::new();
        for bytes in self
            .store
            .scan_prefix_values(&keys::edge_prefix(&self.tenant))?
        {
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    fn get_edges(&self, id: Uuid, direction: Direction) -> Result<Vec<StoredEdge>> {
        let mut edges = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            edges.extend(self.edges_out(id)?);
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            edges.extend(self.all_edges()?.into_iter().filter(|e| e.dst_id == id));
        }
        Ok(edges)
    }

    // -- vectors --------------------------------------------------------

    fn vector_handle(&self, id: Uuid) -> Result<Option<u32>> {
        match self.store.get(&keys::vector_map_id(&self.tenant, id))? {
            Some(bytes) => {
                let mapping: Value = serde_json::from_slice(&bytes)?;
                Ok(mapping.get("handle").and_then(Value::as_u64).map(|h| h as u32))
            }
            None => Ok(None),
        }
    }

    fn next_vector_handle(&self) -> Result<u32> {
        match self.store.get(&keys::vector_map_next(&self.tenant))? {
            Some(bytes) => {
                let v: Value = serde_json::from_slice(&bytes)?;
                Ok(v.get("next").and_then(Value::as_u64).unwrap_or(0) as u32)
            }
            None => Ok(0),
        }
    }

    fn set_embedding(&self, id: Uuid, vector: Vec<f32>) -> Result<()> {
        let Some(mut entity) = self.get_entity(id)? else {
            return Err(DbError::UnknownEntity(id));
        };
        if vector.len() != self.vectors.dim() {
            return Err(DbError::DimMismatch {
                expected: self.vectors.dim(),
                actual: vector.len(),
            });
        }

        let old_handle = self.vector_handle(id)?;
        let handle = self.next_vector_handle()?;

        entity.embedding = Some(vector.clone());
        entity.modified_at = chrono::Utc::now();

        let mut ops = vec![
            WriteOp::put(
                keys::entity(&self.tenant, id),
                serde_json::to_vec(&entity)?,
            ),
            WriteOp::put(
                keys::vector_map_handle(&self.tenant, handle),
                serde_json::to_vec(&json!({ "entity_id": id }))?,
            ),
            WriteOp::put(
                keys::vector_map_id(&self.tenant, id),
                serde_json::to_vec(&json!({ "handle": handle }))?,
            ),
            WriteOp::put(
                keys::vector_map_next(&self.tenant),
                serde_json::to_vec(&json!({ "next": handle + 1 }))?,
            ),
        ];
        if let Some(old) = old_handle {
            ops.push(WriteOp::delete(keys::vector_map_handle(&self.tenant, old)));
        }

        let entries = self.wal.append_batch(ops)?;
        self.dispatch_replication(entries);

        if let Some(old) = old_handle {
            self.vectors.forget(old);
        }
        self.vectors.add(handle, &vector)?;
        self.worker.submit(Task::SaveIndex);
        Ok(())
    }

    fn delete_embedding(&self, id: Uuid) -> Result<()> {
        let Some(mut entity) = self.get_entity(id)? else {
            return Err(DbError::UnknownEntity(id));
        };
        let Some(handle) = self.vector_handle(id)? else {
            return Ok(());
        };
        entity.embedding = None;
        entity.modified_at = chrono::Utc::now();
        let ops = vec![
            WriteOp::put(
                keys::entity(&self.tenant, id),
                serde_json::to_vec(&entity)?,
            ),
            WriteOp::delete(keys::vector_map_handle(&self.tenant, handle)),
            WriteOp::delete(keys::vector_map_id(&self.tenant, id)),
        ];
        let entries = self.wal.append_batch(ops)?;
        self.dispatch_replication(entries);
        self.vectors.forget(handle);
        self.worker.submit(Task::SaveIndex);
        Ok(())
    }

    fn search_similar(
        &self,
        query: &[f32],
        k: usize,
        min_score: f32,
        schema_filter: Option<&str>,
    ) -> Result<Vec<(Entity, f32)>> {
        self.stats.record_vector_search();
        let fetch = if schema_filter.is_some() {
            k.saturating_mul(KNN_OVERFETCH)
        } else {
            k
        };
        let mut results = Vec::new();
        for (handle, score) in self.vectors.knn(query, fetch)? {
            if score < min_score {
                continue;
            }
            // Stale handles (re-embeds, deletes) resolve to nothing.
            let Some(bytes) = self
                .store
                .get(&keys::vector_map_handle(&self.tenant, handle))?
            else {
                continue;
            };
            let mapping: Value = serde_json::from_slice(&bytes)?;
            let Some(entity_id) = mapping
                .get("entity_id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Uuid>().ok())
            else {
                continue;
            };
            let Some(entity) = self.get_entity(entity_id)? else {
                continue;
            };
            if entity.embedding.is_none() {
                continue;
            }
            if let Some(schema) = schema_filter {
                if entity.schema != schema {
                    continue;
                }
            }
            results.push((entity, score));
            if results.len() == k {
                break;
            }
        }
        Ok(results)
    }

    // -- query execution ------------------------------------------------

    fn run_query(&self, schema: &Schema, query: Query) -> Result<Vec<Entity>> {
        let mut entities = match plan(query.predicate.as_ref(), &schema.indexed_fields) {
            Plan::IndexIntersect { groups } => {
                self.stats.record_index_intersection();
                let index = SecondaryIndex::new(&self.store, &self.tenant, &schema.name);
                let mut id_sets: Vec<Vec<Uuid>> = Vec::with_capacity(groups.len());
                for group in &groups {
                    let lookups: Vec<(&str, &Value)> =
                        group.iter().map(|(f, v)| (f.as_str(), v)).collect();
                    for _ in &lookups {
                        self.stats.record_index_lookup();
                    }
                    id_sets.push(index.union(&lookups)?);
                }
                id_sets.sort_by_key(Vec::len);
                let mut iter = id_sets.into_iter();
                let mut ids = iter.next().unwrap_or_default();
                for set in iter {
                    ids.retain(|id| set.binary_search(id).is_ok());
                }
                self.fetch_ids(&ids)?
            }
            Plan::IndexUnion { lookups } => {
                self.stats.record_index_union();
                let index = SecondaryIndex::new(&self.store, &self.tenant, &schema.name);
                let refs: Vec<(&str, &Value)> =
                    lookups.iter().map(|(f, v)| (f.as_str(), v)).collect();
                for _ in &refs {
                    self.stats.record_index_lookup();
                }
                let ids = index.union(&refs)?;
                self.fetch_ids(&ids)?
            }
            Plan::FullScan => {
                self.stats.record_full_scan();
                self.scan_entities()?
                    .into_iter()
                    .filter(|e| e.schema == schema.name)
                    .collect()
            }
        };

        // Residual filter: the full predicate always re-runs over fetched
        // rows, which also covers non-indexed children of an And.
        if let Some(predicate) = &query.predicate {
            entities.retain(|e| e.schema == schema.name && predicate.evaluate(e));
        } else {
            entities.retain(|e| e.schema == schema.name);
        }

        if let Some((field, order)) = &query.order_by {
            sort_entities(&mut entities, field, *order);
        }
        Ok(paginate(entities, query.offset, query.limit))
    }

    fn fetch_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.get_entity(*id)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    fn run_similarity(
        &self,
        schema: &Schema,
        similarity: &SimilarityClause,
        statement: &sql::SelectStatement,
    ) -> Result<Vec<Value>> {
        if similarity.field != "embedding" {
            return Err(DbError::UnknownSimilarityField(similarity.field.clone()));
        }
        let embedder = self.embedder.read().clone().ok_or_else(|| {
            DbError::Embedding("no embedding provider bound to this database".into())
        })?;
        let query_vector = embedder.embed(&similarity.query_text)?;

        let k = statement.limit.unwrap_or(DEFAULT_KNN_K);
        let hits = self.search_similar(&query_vector, k, 0.0, Some(&schema.name))?;

        // Hybrid: knn first, then the structural predicate as post-filter.
        let mut rows: Vec<(Entity, f32)> = match &statement.predicate {
            Some(predicate) => hits
                .into_iter()
                .filter(|(e, _)| predicate.evaluate(e))
                .collect(),
            None => hits,
        };

        if let Some(offset) = statement.offset {
            rows = if offset >= rows.len() {
                Vec::new()
            } else {
                rows.split_off(offset)
            };
        }

        Ok(rows
            .iter()
            .map(|(e, score)| project(e, statement.projection.as_deref(), Some(*score)))
            .collect())
    }

    // -- replication ----------------------------------------------------

    fn apply_replicated(&self, entry: &WalEntry) -> Result<bool> {
        let watermark_key = keys::watermark(&self.tenant, &entry.source_peer);
        let watermark = match self.store.get(&watermark_key)? {
            Some(bytes) => {
                let v: Value = serde_json::from_slice(&bytes)?;
                v.get("seq").and_then(Value::as_u64).unwrap_or(0)
            }
            None => 0,
        };
        if entry.seq <= watermark {
            return Ok(false);
        }

        let mut ops = self.wal.replicated_ops(entry)?;
        ops.push(WriteOp::put(
            watermark_key,
            serde_json::to_vec(&json!({ "seq": entry.seq }))?,
        ));
        self.store.batch(ops)?;

        // Keep the schema cache coherent with replicated schema rows.
        let schema_prefix = keys::schema_prefix(&self.tenant);
        if entry.key_bytes.starts_with(&schema_prefix) {
            if let Ok(schema) = serde_json::from_slice::<Schema>(&entry.value_bytes) {
                self.registry.install(schema);
            }
        }
        Ok(true)
    }

    fn follower_watermark(&self, peer_id: &str) -> Result<u64> {
        match self.store.get(&keys::watermark(&self.tenant, peer_id))? {
            Some(bytes) => {
                let v: Value = serde_json::from_slice(&bytes)?;
                Ok(v.get("seq").and_then(Value::as_u64).unwrap_or(0))
            }
            None => Ok(0),
        }
    }
}
