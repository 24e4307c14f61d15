use tempfile::TempDir;

use studydb_core::metadata::ChunkMetadata;
use studydb_core::types::NewChunk;
use studydb_text::ContentStore;

fn meta(source: &str, subject: Option<&str>, chunk_index: usize) -> ChunkMetadata {
    ChunkMetadata {
        filename: source.rsplit('/').next().map(str::to_string),
        source_path: Some(source.to_string()),
        subject: subject.map(str::to_string),
        chunk_index,
        ..Default::default()
    }
}

#[test]
fn add_then_get_round_trips_content_and_metadata() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    let m = meta("/notes/cells.txt", Some("Biology"), 0);
    let id = store.add("The cell membrane controls transport.", &m).expect("add");

    let chunk = store.get(id).expect("get").expect("present");
    assert_eq!(chunk.id, id);
    assert_eq!(chunk.content, "The cell membrane controls transport.");
    assert_eq!(chunk.metadata, m);
    assert!(store.get(id + 100).expect("get").is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn ids_are_strictly_increasing_and_survive_restart() {
    let tmp = TempDir::new().expect("tmp");
    let first = {
        let mut store = ContentStore::open(tmp.path()).expect("open");
        let a = store.add("alpha", &ChunkMetadata::default()).expect("add");
        let more = store
            .add_many(&[
                NewChunk { content: "bravo".into(), metadata: ChunkMetadata::default() },
                NewChunk { content: "charlie".into(), metadata: ChunkMetadata::default() },
            ])
            .expect("add many");
        assert!(a < more[0] && more[0] < more[1]);
        more[1]
    };

    let mut reopened = ContentStore::open(tmp.path()).expect("reopen");
    assert_eq!(reopened.len(), 3);
    let next = reopened.add("delta", &ChunkMetadata::default()).expect("add");
    assert!(next > first, "id {next} must exceed every id issued before restart ({first})");
    assert_eq!(reopened.get(first).expect("get").expect("present").content, "charlie");
}

#[test]
fn keyword_search_ranks_by_relevance_and_truncates() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    let weak = store.add("volcano eruptions are studied in geology", &ChunkMetadata::default()).expect("add");
    let strong = store.add("volcano volcano volcano lava", &ChunkMetadata::default()).expect("add");
    store.add("oceans cover most of the planet", &ChunkMetadata::default()).expect("add");

    let hits = store.search_keyword("volcano", 10, None).expect("search");
    let ids: Vec<_> = hits.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![strong, weak]);

    let top = store.search_keyword("volcano", 1, None).expect("search");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, strong);

    assert!(store.search_keyword("   ", 5, None).expect("search").is_empty());
    assert!(store.search_keyword("volcano", 0, None).expect("search").is_empty());
}

#[test]
fn keyword_search_accepts_k_beyond_the_document_count() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    assert!(store.search_keyword("volcano", usize::MAX, None).expect("search").is_empty());

    let id = store.add("volcano lava", &ChunkMetadata::default()).expect("add");
    for k in [usize::MAX, usize::MAX / 5, 1 << 40] {
        let hits = store.search_keyword("volcano", k, Some("geology")).expect("search");
        assert!(hits.is_empty());
        let hits = store.search_keyword("volcano", k, None).expect("search");
        assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![id]);
    }
}

#[test]
fn keyword_search_stems_requires_all_terms_and_tolerates_syntax() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    let both = store.add("Instruments of the orchestra include the xylophone", &ChunkMetadata::default()).expect("add");
    store.add("An instrument panel in a cockpit", &ChunkMetadata::default()).expect("add");

    let hits = store.search_keyword("instrument xylophone", 5, None).expect("search");
    assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![both]);

    let stemmed = store.search_keyword("instruments", 5, None).expect("search");
    assert_eq!(stemmed.len(), 2);

    assert!(store.search_keyword("xylophone?) AND (", 5, None).is_ok());
}

#[test]
fn keyword_search_filters_by_subject_case_insensitively() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    store.add("energy conservation in closed systems", &meta("/a.txt", Some("Physics"), 0)).expect("add");
    let bio = store.add("energy flows through food webs", &meta("/b.txt", Some("Biology"), 0)).expect("add");
    store.add("energy policy debates", &meta("/c.txt", None, 0)).expect("add");

    let hits = store.search_keyword("energy", 5, Some("biology")).expect("search");
    assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![bio]);
    assert_eq!(store.search_keyword("energy", 5, None).expect("search").len(), 3);
}

#[test]
fn keyword_search_matches_metadata_fields() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    let m = ChunkMetadata { title: Some("Thermodynamics".into()), ..Default::default() };
    let id = store.add("heat moves from hot to cold", &m).expect("add");
    let hits = store.search_keyword("thermodynamics", 5, None).expect("search");
    assert_eq!(hits.iter().map(|c| c.id).collect::<Vec<_>>(), vec![id]);
}

#[test]
fn list_documents_groups_chunks_by_source() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = ContentStore::open(tmp.path()).expect("open");
    let chunks: Vec<NewChunk> = [
        ("/docs/a.md", Some("Math"), 0),
        ("/docs/a.md", Some("Math"), 1),
        ("/docs/b.txt", Some("History"), 0),
        ("/docs/a.md", Some("Math"), 2),
        ("/docs/c.txt", Some("math"), 0),
    ]
    .into_iter()
    .map(|(src, subject, idx)| NewChunk { content: format!("{src} part {idx}"), metadata: meta(src, subject, idx) })
    .collect();
    let ids = store.add_many(&chunks).expect("add");
    store.add("loose lecture text", &ChunkMetadata::default()).expect("add");

    let all = store.list_documents(None).expect("list");
    let keys: Vec<_> = all.iter().map(|d| d.metadata.document_key().to_string()).collect();
    assert_eq!(keys, vec!["/docs/a.md", "/docs/b.txt", "/docs/c.txt", "unknown"]);
    assert_eq!(all[0].id, ids[0]);
    assert_eq!(all[0].filename, "a.md");
    assert_eq!(all[0].file_type, "md");
    assert_eq!(all[3].filename, "unknown");
    assert_eq!(all[3].subject, "Uncategorized");

    let math = store.list_documents(Some("MATH")).expect("list");
    assert_eq!(math.iter().map(|d| d.filename.as_str()).collect::<Vec<_>>(), vec!["a.md", "c.txt"]);
    assert!(math.iter().all(|d| d.subject.eq_ignore_ascii_case("math")));

    assert_eq!(store.list_subjects().expect("subjects"), vec!["History", "Math", "math"]);
}
