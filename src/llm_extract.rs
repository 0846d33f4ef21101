// src/llm_extract.rs

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::upload::InlinePayload;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use urlencoding::encode;

/// The instruction text sent next to every document.
pub const EXTRACTION_PROMPT: &str = r#"Extract invoice information from this document. Extract ALL line items, separating products and charges.

IMPORTANT EXTRACTION RULES:
1. IGNORE the invoice maker's contact details (phone/email at the top of invoice)
2. For customer phone number: Look for Mobile, Ph, Contact ONLY in the Consignee/Customer section
3. For product tax: Calculate as sum of CGST + SGST shown for each product
4. For total tax: Sum all GST amounts (all CGST + SGST combined)
5. For priceWithTax: Multiply quantity * unitPrice and add tax amount
6. All amounts should be numbers without currency symbols
7. Quantity should be extracted as numbers only
8. DO NOT MAKE UP OR ASSUME ANY VALUES - if a field is not found, leave it empty

Return ONLY a valid JSON object with these specific requirements:

invoice: {
  serialNumber: Invoice/Bill number exactly as shown,
  totalAmount: Final total amount with all taxes and charges,
  quantity: Total items purchased (sum of all product quantities),
  tax: Sum of all GST amounts including all products (all CGST + SGST combined),
  date: Invoice date exactly as shown,
  customerName: Name from Consignee section only,
  productName: Name of the first product only,
  additionalCharges: {
    makingCharges: Amount of making charges (if any),
    debitCardCharges: Amount of debit card charges (if any),
    shippingCharges: Total shipping charges (if any),
    otherCharges: Any other additional charges
  }
},

products: Array of ONLY actual product items, each containing:
  - name: Full product description
  - quantity: Number of items (numeric only)
  - unitPrice: Base price per item (numeric only)
  - discount: Discount amount (if any, numeric only)
  - tax: GST per product (CGST + SGST, numeric only)
  - priceWithTax: (quantity * unitPrice) - discount + tax

customer: {
  name: Name from Consignee section only,
  phoneNumber: Phone number from Consignee section only (if not found, leave empty),
  totalPurchaseAmount: Same as invoice.totalAmount
}

Example structure (with placeholder values):
{
  "invoice": {
    "serialNumber": "[INVOICE_NUMBER]",
    "customerName": "[CONSIGNEE_NAME]",
    "productName": "[FIRST_PRODUCT_NAME]",
    "totalAmount": "0.00",
    "tax": "0.00",
    "date": "[DATE]",
    "additionalCharges": {
      "makingCharges": "0.00",
      "debitCardCharges": "0.00",
      "shippingCharges": "0.00",
      "otherCharges": "0.00"
    }
  },
  "products": [
    {
      "name": "[PRODUCT_NAME]",
      "quantity": "0",
      "unitPrice": "0.00",
      "discount": "0.00",
      "tax": "0.00",
      "priceWithTax": "0.00"
    }
  ],
  "customer": {
    "name": "[CONSIGNEE_NAME]",
    "phoneNumber": "[CONSIGNEE_PHONE_NUMBER]",
    "totalPurchaseAmount": "0.00"
  }
}"#;

/// Something that turns a document into the model's raw text answer.
#[async_trait]
pub trait ExtractionService {
    async fn extract(&self, payload: &InlinePayload) -> Result<String, ExtractionError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Client for a hosted generative model's `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    url: String,
    api_key: String,
    temperature: f64,
}

impl GeminiClient {
    /// Resolve the endpoint and read the API key from the configured env var.
    pub fn from_config(cfg: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| ExtractionError::MissingCredential(cfg.api_key_env.clone()))?;
        Ok(Self::new(cfg, api_key))
    }

    pub fn new(cfg: &ExtractionConfig, api_key: String) -> Self {
        let url = format!(
            "{}/models/{}:generateContent",
            cfg.base_url.trim_end_matches('/'),
            encode(&cfg.model)
        );
        info!(url = %url, model = %cfg.model, "Using extraction endpoint");
        Self {
            client: Client::new(),
            url,
            api_key,
            temperature: cfg.temperature,
        }
    }
}

fn build_request(payload: &InlinePayload, temperature: f64) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                RequestPart::Inline {
                    inline_data: InlineData {
                        mime_type: &payload.mime_type,
                        data: &payload.data,
                    },
                },
                RequestPart::Text {
                    text: EXTRACTION_PROMPT,
                },
            ],
        }],
        generation_config: GenerationConfig { temperature },
    }
}

#[async_trait]
impl ExtractionService for GeminiClient {
    async fn extract(&self, payload: &InlinePayload) -> Result<String, ExtractionError> {
        let request = build_request(payload, self.temperature);

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status { status, body });
        }

        let generated: GenerateResponse = response.json().await?;
        let text = generated
            .into_text()
            .ok_or(ExtractionError::EmptyResponse)?;

        info!(chars = text.len(), "Received model response");
        Ok(text)
    }
}
