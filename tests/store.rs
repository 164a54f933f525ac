//! Integration tests for the chunk index: document synthesis, similarity
//! search, metadata updates, and collection lifecycle, against a real
//! SQLite file.

use tempfile::TempDir;

use docqa::models::ChunkRecord;
use docqa::store::{MetadataUpdate, VectorStore};
use docqa::{db, migrate};

async fn setup() -> (TempDir, VectorStore) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("data").join("index.sqlite"))
        .await
        .unwrap();
    migrate::create_schema(&pool).await.unwrap();
    (tmp, VectorStore::new(pool))
}

fn chunk(document_id: &str, index: i64, total: i64, content: &str) -> ChunkRecord {
    ChunkRecord {
        id: format!("{}-{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        total_chunks: total,
        content: content.to_string(),
        filename: format!("{}.txt", document_id),
        file_type: ".txt".to_string(),
        file_size: 1234,
        uploaded_at: 1_700_000_000 + index,
        tags: "alpha,beta".to_string(),
        description: Some("original description".to_string()),
    }
}

fn unit(x: f32, y: f32) -> Vec<f32> {
    let norm = (x * x + y * y).sqrt();
    vec![x / norm, y / norm]
}

#[tokio::test]
async fn insert_and_synthesize_documents() {
    let (_tmp, store) = setup().await;

    let doc_a = vec![
        chunk("doc-a", 0, 3, "a zero"),
        chunk("doc-a", 1, 3, "a one"),
        chunk("doc-a", 2, 3, "a two"),
    ];
    let doc_b = vec![chunk("doc-b", 0, 1, "b zero")];

    let inserted = store
        .insert(&doc_a, &vec![unit(1.0, 0.0); 3])
        .await
        .unwrap();
    assert_eq!(inserted, 3);
    store.insert(&doc_b, &[unit(0.0, 1.0)]).await.unwrap();

    let documents = store.all_documents().await;
    assert_eq!(documents.len(), 2);

    let a = documents
        .iter()
        .find(|d| d.document_id == "doc-a")
        .unwrap();
    assert_eq!(a.chunk_count, 3);
    assert_eq!(a.filename, "doc-a.txt");
    assert_eq!(a.tags, vec!["alpha", "beta"]);
    assert_eq!(a.file_size_bytes, 1234);

    let b = store.document_by_id("doc-b").await.unwrap();
    assert_eq!(b.chunk_count, 1);
}

#[tokio::test]
async fn insert_rejects_count_mismatch() {
    let (_tmp, store) = setup().await;
    let chunks = vec![chunk("doc", 0, 1, "text")];
    assert!(store.insert(&chunks, &[]).await.is_err());
}

#[tokio::test]
async fn unknown_document_is_none() {
    let (_tmp, store) = setup().await;
    assert!(store.document_by_id("missing").await.is_none());
    assert!(store.document_content("missing").await.is_none());
}

#[tokio::test]
async fn content_reconstructs_in_index_order() {
    let (_tmp, store) = setup().await;

    // Insert out of order; reconstruction must follow chunk_index.
    let chunks = vec![
        chunk("doc", 2, 3, "third part"),
        chunk("doc", 0, 3, "first part"),
        chunk("doc", 1, 3, "second part"),
    ];
    store
        .insert(&chunks, &vec![unit(1.0, 0.0); 3])
        .await
        .unwrap();

    let content = store.document_content("doc").await.unwrap();
    assert_eq!(content, "first part\n\nsecond part\n\nthird part");
}

#[tokio::test]
async fn search_ranks_by_cosine_similarity() {
    let (_tmp, store) = setup().await;

    let chunks = vec![
        chunk("doc", 0, 3, "exactly aligned"),
        chunk("doc", 1, 3, "somewhat aligned"),
        chunk("doc", 2, 3, "orthogonal"),
    ];
    let vectors = vec![unit(1.0, 0.0), unit(1.0, 1.0), unit(0.0, 1.0)];
    store.insert(&chunks, &vectors).await.unwrap();

    let hits = store.search(&unit(1.0, 0.0), 10, &[]).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk.content, "exactly aligned");
    assert_eq!(hits[1].chunk.content, "somewhat aligned");
    assert_eq!(hits[2].chunk.content, "orthogonal");
    assert!(hits[0].score > hits[1].score);
    assert!(hits[1].score > hits[2].score);

    // k caps the result set.
    let top = store.search(&unit(1.0, 0.0), 2, &[]).await.unwrap();
    assert_eq!(top.len(), 2);
}

#[tokio::test]
async fn search_empty_index_is_empty_not_error() {
    let (_tmp, store) = setup().await;
    let hits = store.search(&unit(1.0, 0.0), 5, &[]).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn search_filters_compose_with_and() {
    let (_tmp, store) = setup().await;

    let mut pdf = chunk("doc-pdf", 0, 1, "pdf chunk");
    pdf.file_type = ".pdf".to_string();
    pdf.filename = "report.pdf".to_string();
    let txt = chunk("doc-txt", 0, 1, "txt chunk");

    store
        .insert(&[pdf, txt], &[unit(1.0, 0.0), unit(1.0, 0.0)])
        .await
        .unwrap();

    let filters = vec![("file_type".to_string(), ".pdf".to_string())];
    let hits = store.search(&unit(1.0, 0.0), 10, &filters).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.file_type, ".pdf");

    let filters = vec![
        ("file_type".to_string(), ".pdf".to_string()),
        ("filename".to_string(), "other.pdf".to_string()),
    ];
    let hits = store.search(&unit(1.0, 0.0), 10, &filters).await.unwrap();
    assert!(hits.is_empty());

    let bad = vec![("no_such_field".to_string(), "x".to_string())];
    assert!(store.search(&unit(1.0, 0.0), 10, &bad).await.is_err());
}

#[tokio::test]
async fn search_documents_requires_a_query_vector() {
    let (_tmp, store) = setup().await;
    store
        .insert(&[chunk("doc", 0, 1, "text")], &[unit(1.0, 0.0)])
        .await
        .unwrap();

    let hits = store.search_documents(None, &[], 10).await.unwrap();
    assert!(hits.is_empty());

    let vec = unit(1.0, 0.0);
    let hits = store
        .search_documents(Some(vec.as_slice()), &[], 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn delete_removes_every_chunk() {
    let (_tmp, store) = setup().await;

    let chunks = vec![chunk("doc", 0, 2, "one"), chunk("doc", 1, 2, "two")];
    store
        .insert(&chunks, &vec![unit(1.0, 0.0); 2])
        .await
        .unwrap();

    assert!(store.delete_document("doc").await);
    assert!(store.document_by_id("doc").await.is_none());
    assert_eq!(store.chunk_count().await.unwrap(), 0);

    // Deleting an unknown id is not a failure at this layer.
    assert!(store.delete_document("missing").await);
}

#[tokio::test]
async fn metadata_update_propagates_to_all_chunks() {
    let (_tmp, store) = setup().await;

    let chunks = vec![
        chunk("doc", 0, 3, "one"),
        chunk("doc", 1, 3, "two"),
        chunk("doc", 2, 3, "three"),
    ];
    store
        .insert(&chunks, &vec![unit(1.0, 0.0); 3])
        .await
        .unwrap();

    let updates = MetadataUpdate {
        tags: Some(vec!["fresh".to_string()]),
        description: Some("new description".to_string()),
    };
    assert!(store.update_metadata("doc", &updates).await.unwrap());

    // Every chunk carries the new denormalized fields.
    let hits = store.search(&unit(1.0, 0.0), 10, &[]).await.unwrap();
    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert_eq!(hit.chunk.tags, "fresh");
        assert_eq!(hit.chunk.description.as_deref(), Some("new description"));
    }

    // The synthesized records reflect the update too.
    let doc = store.document_by_id("doc").await.unwrap();
    assert_eq!(doc.tags, vec!["fresh"]);
    assert_eq!(doc.description.as_deref(), Some("new description"));

    let listed = store.all_documents().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].tags, vec!["fresh"]);
}

#[tokio::test]
async fn partial_metadata_update_preserves_other_fields() {
    let (_tmp, store) = setup().await;

    store
        .insert(&[chunk("doc", 0, 1, "one")], &[unit(1.0, 0.0)])
        .await
        .unwrap();

    let updates = MetadataUpdate {
        tags: None,
        description: Some("only description changed".to_string()),
    };
    assert!(store.update_metadata("doc", &updates).await.unwrap());

    let doc = store.document_by_id("doc").await.unwrap();
    assert_eq!(doc.tags, vec!["alpha", "beta"]);
    assert_eq!(
        doc.description.as_deref(),
        Some("only description changed")
    );
}

#[tokio::test]
async fn metadata_update_unknown_document_is_false() {
    let (_tmp, store) = setup().await;
    let updates = MetadataUpdate {
        tags: Some(vec!["x".to_string()]),
        description: None,
    };
    assert!(!store.update_metadata("missing", &updates).await.unwrap());
}

#[tokio::test]
async fn delete_collection_reinitializes_empty_index() {
    let (_tmp, store) = setup().await;

    store
        .insert(&[chunk("doc", 0, 1, "one")], &[unit(1.0, 0.0)])
        .await
        .unwrap();
    assert_eq!(store.chunk_count().await.unwrap(), 1);

    store.delete_collection().await.unwrap();
    assert_eq!(store.chunk_count().await.unwrap(), 0);
    assert!(store.all_documents().await.is_empty());

    // The fresh index accepts new inserts.
    store
        .insert(&[chunk("doc2", 0, 1, "again")], &[unit(0.0, 1.0)])
        .await
        .unwrap();
    assert_eq!(store.chunk_count().await.unwrap(), 1);
}
