use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const CONTENT_TOKENIZER: &str = "content_en";

/// Field handles resolved once per opened index.
#[derive(Debug, Clone, Copy)]
pub struct StoreFields {
	pub id: Field,
	pub content: Field,
	pub metadata: Field,
}

impl StoreFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			content: schema.get_field("content")?,
			metadata: schema.get_field("metadata")?,
		})
	}
}

/// `id` is the primary key (indexed for point lookups, fast for max-id
/// recovery). `content` and the serialized `metadata` are both stored and
/// searchable, so keyword queries also hit filenames, titles and subjects.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_u64_field("id", INDEXED | STORED | FAST);
	let text_field_indexing = TextFieldIndexing::default()
		.set_tokenizer(CONTENT_TOKENIZER)
		.set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("content", text_options.clone());
	schema_builder.add_text_field("metadata", text_options);
	schema_builder.build()
}

/// Lowercased, stop-worded, English-stemmed tokens. Must be registered every
/// time an index is opened.
pub fn register_tokenizer(index: &Index) {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.filter(Stemmer::new(Language::English))
		.build();
	index.tokenizers().register(CONTENT_TOKENIZER, tokenizer);
}
