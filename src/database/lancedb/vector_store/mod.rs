
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{contains_any_predicate, literal_terms};
use crate::RagError;
use crate::chunker::ChunkMetadata;
use crate::config::{Config, StoreConfig};
use crate::database::{
    DocumentStore, NewDocument, RetrievedMatch, SampleFilter, StoredDocument, cosine_similarity,
    hybrid_score, query_tokens, token_overlap,
};

const TABLE_NAME: &str = "chunks";

/// LanceDB-backed document store
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    /// Current vector width; the lock also serializes writes and schema changes
    vector_dimension: Mutex<usize>,
    keyword_weight: f32,
    candidate_pool: usize,
}

/// A parsed row together with its stored vector
struct StoredRow {
    document: StoredDocument,
    vector: Vec<f32>,
}

impl VectorStore {
    /// Open the store under the configured vector database directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, RagError> {
        Self::open(
            &config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
            &config.store,
        )
        .await
    }

    /// Open (or create) the store at `db_path`.
    ///
    /// An existing table keeps its vector width; a new table is created with
    /// `dimension`.
    #[inline]
    pub async fn open(
        db_path: &Path,
        dimension: usize,
        settings: &StoreConfig,
    ) -> Result<Self, RagError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.display().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: Mutex::new(dimension),
            keyword_weight: settings.keyword_weight,
            candidate_pool: settings.candidate_pool,
        };
        store.initialize_table(dimension).await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    async fn initialize_table(&self, dimension: usize) -> Result<(), RagError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != dimension {
                info!(
                    "Existing table uses {} dimensions (configured {})",
                    existing, dimension
                );
            }
            *self.vector_dimension.lock().await = existing;
            return Ok(());
        }

        self.create_table(dimension).await
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize, RagError> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("program_name", DataType::Utf8, true),
            Field::new("program_code", DataType::Utf8, true),
            Field::new("institution", DataType::Utf8, true),
            Field::new("section", DataType::Utf8, true),
            Field::new("chunk_type", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn create_table(&self, vector_dim: usize) -> Result<(), RagError> {
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!("Chunks table created with {} dimensions", vector_dim);
        Ok(())
    }

    async fn open_table(&self) -> Result<Table, RagError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Drop the chunks table if it exists
    async fn drop_table_if_exists(&self) -> Result<(), RagError> {
        let table_names =
            self.connection.table_names().execute().await.map_err(|e| {
                RagError::Database(format!("Failed to list tables for drop: {}", e))
            })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing chunks table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    async fn count_rows(&self) -> Result<u64, RagError> {
        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Store one document, adopting its vector width if the table is still empty
    #[inline]
    pub async fn insert_document(&self, document: &NewDocument) -> Result<String, RagError> {
        let vector_dim = document.embedding.len();
        if vector_dim == 0 {
            return Err(RagError::Database("Cannot store an empty embedding".to_string()));
        }

        {
            // held only while the table width is checked or changed
            let mut dimension = self.vector_dimension.lock().await;
            if *dimension != vector_dim {
                if self.count_rows().await? > 0 {
                    return Err(RagError::Database(format!(
                        "Embedding has {} dimensions but the store holds {}-dimensional vectors",
                        vector_dim, *dimension
                    )));
                }
                info!(
                    "Vector dimension changed from {} to {}, recreating empty table",
                    *dimension, vector_dim
                );
                self.drop_table_if_exists().await?;
                self.create_table(vector_dim).await?;
                *dimension = vector_dim;
            }
        }

        let id = Uuid::new_v4().to_string();
        let record_batch = Self::create_record_batch(&id, document, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunk: {}", e)))?;

        debug!("Stored chunk {} ({} chars)", id, document.content.len());
        Ok(id)
    }

    fn create_record_batch(
        id: &str,
        document: &NewDocument,
        vector_dim: usize,
    ) -> Result<RecordBatch, RagError> {
        let metadata = &document.metadata;
        let values_array = Float32Array::from(document.embedding.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    RagError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let created_at = Utc::now().to_rfc3339();
        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(vec![id])),
            Arc::new(vector_array),
            Arc::new(StringArray::from(vec![document.content.as_str()])),
            Arc::new(StringArray::from(vec![metadata.program_name.as_deref()])),
            Arc::new(StringArray::from(vec![metadata.program_code.as_deref()])),
            Arc::new(StringArray::from(vec![metadata.institution.as_deref()])),
            Arc::new(StringArray::from(vec![metadata.section.as_deref()])),
            Arc::new(StringArray::from(vec![metadata.chunk_type.as_str()])),
            Arc::new(UInt32Array::from(vec![metadata.chunk_index])),
            Arc::new(StringArray::from(vec![created_at.as_str()])),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Hybrid search over the union of vector neighbours and keyword hits
    #[inline]
    pub async fn search_hybrid(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedMatch>, RagError> {
        let tokens = query_tokens(query_text);
        let table = self.open_table().await?;

        let results = table
            .vector_search(query_embedding)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(self.candidate_pool)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;
        let mut rows = Self::parse_rows(results).await?;

        if let Some(predicate) = contains_any_predicate(&literal_terms(query_text)) {
            let results = table
                .query()
                .only_if(predicate)
                .limit(self.candidate_pool)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to execute text query: {}", e)))?;
            rows.extend(Self::parse_rows(results).await?);
        }

        let mut seen = HashSet::new();
        let mut matches: Vec<RetrievedMatch> = rows
            .into_iter()
            .filter(|row| seen.insert(row.document.id.clone()))
            .filter_map(|row| {
                let score = hybrid_score(
                    cosine_similarity(query_embedding, &row.vector),
                    token_overlap(&row.document.content, &tokens),
                    self.keyword_weight,
                );
                (score >= threshold).then(|| RetrievedMatch::scored(row.document, score))
            })
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);

        debug!(
            "Hybrid search for {:?} returned {} matches",
            query_text,
            matches.len()
        );
        Ok(matches)
    }

    async fn query_documents(
        &self,
        predicate: Option<String>,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, RagError> {
        let table = self.open_table().await?;
        let mut query = table.query().limit(limit);
        if let Some(predicate) = predicate {
            query = query.only_if(predicate);
        }

        let results = query
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute query: {}", e)))?;

        Ok(Self::parse_rows(results)
            .await?
            .into_iter()
            .map(|row| row.document)
            .collect())
    }

    async fn parse_rows(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<StoredRow>, RagError> {
        let mut rows = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            rows.extend(Self::parse_batch(&batch)?);
        }

        Ok(rows)
    }

    fn parse_batch(batch: &RecordBatch) -> Result<Vec<StoredRow>, RagError> {
        let ids = column::<StringArray>(batch, "id")?;
        let vectors = column::<FixedSizeListArray>(batch, "vector")?;
        let contents = column::<StringArray>(batch, "content")?;
        let program_names = column::<StringArray>(batch, "program_name")?;
        let program_codes = column::<StringArray>(batch, "program_code")?;
        let institutions = column::<StringArray>(batch, "institution")?;
        let sections = column::<StringArray>(batch, "section")?;
        let chunk_types = column::<StringArray>(batch, "chunk_type")?;
        let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let vector_values = vectors.value(row);
            let vector = vector_values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| RagError::Database("Invalid vector item type".to_string()))?
                .values()
                .to_vec();

            let chunk_type = chunk_types.value(row).parse().map_err(|e| {
                RagError::Database(format!("Invalid chunk type in row {}: {}", row, e))
            })?;

            rows.push(StoredRow {
                document: StoredDocument {
                    id: ids.value(row).to_string(),
                    content: contents.value(row).to_string(),
                    metadata: ChunkMetadata {
                        program_name: optional_string(program_names, row),
                        program_code: optional_string(program_codes, row),
                        institution: optional_string(institutions, row),
                        section: optional_string(sections, row),
                        chunk_type,
                        chunk_index: chunk_indices.value(row),
                    },
                },
                vector,
            });
        }

        Ok(rows)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn optional_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

#[async_trait]
impl DocumentStore for VectorStore {
    async fn insert(&self, document: NewDocument) -> anyhow::Result<String> {
        Ok(self.insert_document(&document).await?)
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> anyhow::Result<Vec<RetrievedMatch>> {
        Ok(self
            .search_hybrid(query_embedding, query_text, threshold, limit)
            .await?)
    }

    async fn text_search(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> anyhow::Result<Vec<StoredDocument>> {
        let Some(predicate) = contains_any_predicate(keywords) else {
            debug!("Text search skipped: no usable keywords");
            return Ok(Vec::new());
        };
        Ok(self.query_documents(Some(predicate), limit).await?)
    }

    async fn sample(
        &self,
        limit: usize,
        filter: SampleFilter,
    ) -> anyhow::Result<Vec<StoredDocument>> {
        let predicate = match filter {
            SampleFilter::Any => None,
            SampleFilter::HasProgramName => Some("program_name IS NOT NULL".to_string()),
        };
        Ok(self.query_documents(predicate, limit).await?)
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        let dimension = self.vector_dimension.lock().await;
        warn!("Deleting all stored chunks");
        self.drop_table_if_exists().await?;
        self.create_table(*dimension).await?;
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.count_rows().await?)
    }
}
