// src/pipeline.rs

use crate::error::Result;
use crate::llm_extract::ExtractionService;
use crate::sanitize::sanitize;
use crate::schema::ExtractedBatch;
use crate::store::{RecordStore, dispatch, now_millis};
use crate::upload::{UploadFile, encode_payload, normalize_format};
use crate::validate::validate;
use std::path::Path;
use tracing::{Instrument, info, info_span};

/// Runs uploads through normalize → encode → extract → sanitize → validate
/// → dispatch.
///
/// Uploads take the store by `&mut`, so two uploads can never interleave
/// their dispatches into the same store.
pub struct Pipeline<S> {
    service: S,
}

impl<S: ExtractionService> Pipeline<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Read `path` and run it through the pipeline.
    pub async fn process(&self, path: impl AsRef<Path>, store: &mut RecordStore) -> Result<i64> {
        match UploadFile::read(path).await {
            Ok(file) => self.process_file(file, store).await,
            Err(e) => record_outcome(Err(e), store),
        }
    }

    /// Process `paths` one after another. Returns how many uploads failed;
    /// the error slot only keeps the outcome of the last one.
    pub async fn process_all<P: AsRef<Path>>(
        &self,
        paths: &[P],
        store: &mut RecordStore,
    ) -> usize {
        let mut failed = 0;
        for path in paths {
            if self.process(path, store).await.is_err() {
                failed += 1;
            }
        }
        failed
    }

    /// Run an already-read upload through the pipeline.
    ///
    /// On success the batch is appended to `store`, the error slot is cleared
    /// and the batch stamp returned. On failure nothing is appended and the
    /// error slot holds the message.
    pub async fn process_file(&self, file: UploadFile, store: &mut RecordStore) -> Result<i64> {
        let span = info_span!("upload", token = %file.token(), file = %file.name);

        let result = self
            .extract_batch(file)
            .instrument(span.clone())
            .await
            .map(|batch| span.in_scope(|| dispatch(batch, now_millis(), store)));

        span.in_scope(|| record_outcome(result, store))
    }

    /// Everything up to and including validation. Nothing here touches the
    /// store, so a failure can't leave a half-dispatched batch behind.
    async fn extract_batch(&self, file: UploadFile) -> Result<ExtractedBatch> {
        let file = normalize_format(file)?;
        let payload = encode_payload(&file);
        info!(
            mime = %payload.mime_type,
            encoded = payload.data.len(),
            "Encoded payload"
        );

        let raw = self.service.extract(&payload).await?;
        let data = sanitize(&raw)?;
        let batch = validate(&data)?;
        info!(products = batch.products.len(), "Validated extraction");
        Ok(batch)
    }
}

fn record_outcome(result: Result<i64>, store: &mut RecordStore) -> Result<i64> {
    match &result {
        Ok(_) => store.clear_error(),
        Err(e) => {
            tracing::error!(error = %e, "Upload failed");
            store.set_error(format!("Data extraction failed: {e}"));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, FormatError, PipelineError, ValidationError};
    use crate::upload::InlinePayload;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const SAMPLE: &str = r#"{"invoice":{"serialNumber":"INV1","totalAmount":"100.00"},"customer":{"name":"Alice"},"products":[{"name":"Widget","quantity":"2","unitPrice":"50.00"}]}"#;

    /// Replies with a fixed answer and remembers what it was sent.
    struct Scripted {
        reply: std::result::Result<String, u16>,
        seen: Mutex<Vec<InlinePayload>>,
    }

    impl Scripted {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExtractionService for Scripted {
        async fn extract(
            &self,
            payload: &InlinePayload,
        ) -> std::result::Result<String, ExtractionError> {
            self.seen.lock().unwrap().push(payload.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(ExtractionError::Status {
                    status: *status,
                    body: "quota exceeded".to_string(),
                }),
            }
        }
    }

    fn pdf() -> UploadFile {
        UploadFile {
            name: "invoice.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.7 fake".to_vec(),
        }
    }

    fn assert_empty(store: &RecordStore) {
        assert!(store.invoices().is_empty());
        assert!(store.customers().is_empty());
        assert!(store.products().is_empty());
    }

    #[tokio::test]
    async fn test_sample_upload_end_to_end() {
        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();

        pipeline.process_file(pdf(), &mut store).await.unwrap();

        assert_eq!(store.invoices().len(), 1);
        assert_eq!(store.customers().len(), 1);
        assert_eq!(store.products().len(), 1);
        assert_eq!(store.error(), None);

        let invoice = &store.invoices()[0];
        assert_eq!(invoice.customer_name, "N/A");
        assert_eq!(invoice.date, "N/A");
        assert_eq!(invoice.tax, "0.00");
        assert!(invoice.id.starts_with("inv_"));

        let customer = &store.customers()[0];
        assert_eq!(customer.phone_number, "N/A");
        assert_eq!(customer.total_purchase_amount, "0.00");
        assert!(customer.id.starts_with("cust_"));

        let product = &store.products()[0];
        assert_eq!(product.discount, "0.00");
        assert_eq!(product.tax, "0.00");
        assert_eq!(product.price_with_tax, "0.00");
        assert!(product.id.starts_with("prod_") && product.id.ends_with("_0"));
    }

    #[tokio::test]
    async fn test_payload_sent_to_service() {
        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();

        pipeline.process_file(pdf(), &mut store).await.unwrap();

        let seen = pipeline.service.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mime_type, "application/pdf");
        assert_eq!(seen[0].data, "JVBERi0xLjcgZmFrZQ==");
    }

    #[tokio::test]
    async fn test_fenced_response_accepted() {
        let fenced = format!("```json\n{SAMPLE}\n```");
        let pipeline = Pipeline::new(Scripted::replying(&fenced));
        let mut store = RecordStore::new();

        pipeline.process_file(pdf(), &mut store).await.unwrap();
        assert_eq!(store.invoices()[0].serial_number, "INV1");
    }

    #[tokio::test]
    async fn test_empty_products_leaves_store_unchanged() {
        let reply = r#"{"invoice":{"serialNumber":"INV2"},"customer":{"name":"Bob"},"products":[]}"#;
        let pipeline = Pipeline::new(Scripted::replying(reply));
        let mut store = RecordStore::new();

        let err = pipeline.process_file(pdf(), &mut store).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::ProductsMissing)
        ));
        assert_empty(&store);
        assert_eq!(
            store.error(),
            Some("Data extraction failed: Products array is empty or missing")
        );
    }

    #[tokio::test]
    async fn test_service_failure_is_reported() {
        let pipeline = Pipeline::new(Scripted::failing(429));
        let mut store = RecordStore::new();

        let err = pipeline.process_file(pdf(), &mut store).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Extraction(ExtractionError::Status { status: 429, .. })
        ));
        assert_eq!(pipeline.service.calls(), 1);
        assert_empty(&store);
        assert!(store.error().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn test_non_json_response_is_parse_error() {
        let pipeline = Pipeline::new(Scripted::replying("Sorry, I can't read that."));
        let mut store = RecordStore::new();

        let err = pipeline.process_file(pdf(), &mut store).await.unwrap_err();

        assert!(matches!(err, PipelineError::Parse(_)));
        assert_empty(&store);
    }

    #[tokio::test]
    async fn test_corrupt_spreadsheet_never_reaches_service() {
        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();
        let sheet = UploadFile {
            name: "items.xlsx".to_string(),
            mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                .to_string(),
            bytes: b"not a workbook".to_vec(),
        };

        let err = pipeline.process_file(sheet, &mut store).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Format(FormatError::Spreadsheet(_))
        ));
        assert_eq!(pipeline.service.calls(), 0);
        assert_empty(&store);
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let mut store = RecordStore::new();

        let failing = Pipeline::new(Scripted::replying(r#"{"products": []}"#));
        let _ = failing.process_file(pdf(), &mut store).await;
        assert!(store.error().is_some());

        let working = Pipeline::new(Scripted::replying(SAMPLE));
        working.process_file(pdf(), &mut store).await.unwrap();
        assert_eq!(store.error(), None);
        assert_eq!(store.invoices().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_batches() {
        let mut store = RecordStore::new();

        Pipeline::new(Scripted::replying(SAMPLE))
            .process_file(pdf(), &mut store)
            .await
            .unwrap();
        let _ = Pipeline::new(Scripted::failing(500))
            .process_file(pdf(), &mut store)
            .await;

        assert_eq!(store.invoices().len(), 1);
        assert_eq!(store.products().len(), 1);
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn test_consecutive_uploads_get_distinct_ids() {
        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();

        let first = pipeline.process_file(pdf(), &mut store).await.unwrap();
        let second = pipeline.process_file(pdf(), &mut store).await.unwrap();

        assert!(second > first);
        assert_ne!(store.products()[0].id, store.products()[1].id);
        assert_ne!(store.invoices()[0].id, store.invoices()[1].id);
    }

    #[tokio::test]
    async fn test_process_reads_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        std::fs::write(&path, "name,qty\nWidget,2\n").unwrap();

        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();
        pipeline.process(&path, &mut store).await.unwrap();

        let seen = pipeline.service.seen.lock().unwrap();
        assert_eq!(seen[0].mime_type, "text/csv");
        assert_eq!(store.invoices().len(), 1);
    }

    #[tokio::test]
    async fn test_process_all_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("items.csv");
        std::fs::write(&good, "name,qty\nWidget,2\n").unwrap();
        let paths = [dir.path().join("gone.pdf"), good, dir.path().join("notes.txt")];

        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();
        let failed = pipeline.process_all(&paths, &mut store).await;

        assert_eq!(failed, 2);
        assert_eq!(pipeline.service.calls(), 1);
        assert_eq!(store.invoices().len(), 1);
        // last upload failed, so its message is the one kept
        assert!(store.error().unwrap().contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_failure_then_success_still_counted() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("items.csv");
        std::fs::write(&good, "name,qty\nWidget,2\n").unwrap();
        let paths = [dir.path().join("gone.pdf"), good];

        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();

        assert_eq!(pipeline.process_all(&paths, &mut store).await, 1);
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(Scripted::replying(SAMPLE));
        let mut store = RecordStore::new();

        let err = pipeline
            .process(dir.path().join("gone.pdf"), &mut store)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(pipeline.service.calls(), 0);
        assert!(store.error().unwrap().starts_with("Data extraction failed:"));
    }
}
