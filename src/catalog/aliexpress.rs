/// AliExpress affiliate gateway client
///
/// Issues signed GET requests against the `/sync` gateway. Every call carries
/// the fixed protocol parameters (app_key, method, timestamp, format,
/// sign_method) plus the call-specific ones, and is signed via `signer`.
///
/// Response parsing is defensive: a missing nesting level yields an empty
/// candidate list, never an error.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::signer::{Params, RequestSigner};
use super::{CatalogError, CatalogPage, CatalogProvider, Candidate, SearchParams};
use crate::config::CatalogConfig;

const PRODUCT_QUERY_METHOD: &str = "aliexpress.affiliate.product.query";
const LINK_GENERATE_METHOD: &str = "aliexpress.affiliate.link.generate";

const PRODUCT_PATH: &[&str] = &[
    "aliexpress_affiliate_product_query_response",
    "resp_result",
    "result",
    "products",
    "product",
];

const LINK_PATH: &[&str] = &[
    "aliexpress_affiliate_link_generate_response",
    "resp_result",
    "result",
    "promotion_links",
    "promotion_link",
];

/// Link type used first; "0" is the fallback mode tried when it yields nothing.
const PRIMARY_LINK_TYPE: &str = "2";
const FALLBACK_LINK_TYPE: &str = "0";

pub struct AliExpressClient {
    client: reqwest::Client,
    base_url: String,
    app_key: String,
    tracking_id: String,
    signer: RequestSigner,
}

impl AliExpressClient {
    /// Create a client from the immutable catalog config.
    ///
    /// # Errors
    /// Returns `CatalogError::NotConfigured` if the app key or secret is missing.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let app_key = non_empty(config.app_key.as_deref());
        let app_secret = non_empty(config.app_secret.as_deref());
        let (app_key, app_secret) = match (app_key, app_secret) {
            (Some(k), Some(s)) => (k, s),
            _ => {
                return Err(CatalogError::NotConfigured(
                    "Missing API credentials. Set AFFSEARCH_CATALOG__APP_KEY and \
                     AFFSEARCH_CATALOG__APP_SECRET or catalog.app_key/app_secret in affiliate-search.toml"
                        .to_string(),
                ))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::Unavailable(format!("HTTP client init failed: {}", e)))?;

        Ok(AliExpressClient {
            client,
            base_url: config.base_url.clone(),
            app_key: app_key.to_string(),
            tracking_id: config.tracking_id.clone(),
            signer: RequestSigner::new(app_secret),
        })
    }

    /// Fixed protocol parameters shared by every method.
    fn base_params(&self, method: &str) -> Params {
        let mut params = Params::new();
        params
            .insert("app_key", &self.app_key)
            .insert("method", method)
            .insert("timestamp", chrono::Utc::now().timestamp_millis())
            .insert("format", "json")
            .insert("sign_method", "md5");
        params
    }

    /// Sign and send. Returns the parsed JSON body of a 2xx response.
    async fn call(&self, mut params: Params) -> Result<Value, CatalogError> {
        self.signer.sign_into(&mut params);
        let query: Vec<(&str, &str)> = params.iter().collect();

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CatalogError::Api { status, message: body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(format!("Failed to parse gateway response: {}", e)))?;

        if let Some(err) = body.get("error_response") {
            return Err(CatalogError::Rejected {
                code: text_field(err, &["code", "sub_code"]).unwrap_or_default(),
                message: text_field(err, &["msg", "sub_msg"]).unwrap_or_default(),
                raw: body.clone(),
            });
        }

        Ok(body)
    }

    async fn request_link(&self, source: &str, link_type: &str) -> Result<String, CatalogError> {
        let mut params = self.base_params(LINK_GENERATE_METHOD);
        params
            .insert("promotion_link_type", link_type)
            .insert("source_values", source)
            .insert("tracking_id", &self.tracking_id);

        let body = self.call(params).await?;
        match extract_promotion_link(&body) {
            Some(link) => Ok(link),
            None => Err(CatalogError::NoLink {
                source_value: source.to_string(),
                raw: body,
            }),
        }
    }
}

#[async_trait]
impl CatalogProvider for AliExpressClient {
    async fn search(&self, search: &SearchParams) -> Result<CatalogPage, CatalogError> {
        let mut params = self.base_params(PRODUCT_QUERY_METHOD);
        params
            .insert("keywords", &search.keywords)
            .insert("page_no", search.page_no)
            .insert("page_size", search.page_size)
            .insert("target_currency", &search.currency)
            .insert("target_language", &search.language)
            .insert("ship_to_country", &search.ship_to)
            .insert("tracking_id", &self.tracking_id)
            .insert_opt("min_sale_price", search.price_min)
            .insert_opt("max_sale_price", search.price_max)
            .insert_opt("delivery_days", search.delivery_days)
            .insert_opt("sort", search.sort.as_deref());

        let raw = self.call(params).await?;
        let candidates = parse_products(&raw, &search.currency);

        tracing::debug!(
            keywords = %search.keywords,
            count = candidates.len(),
            "Catalog search complete"
        );

        Ok(CatalogPage { candidates, raw })
    }

    async fn generate_link(&self, detail_url: &str) -> Result<String, CatalogError> {
        let source = clean_detail_url(detail_url);

        match self.request_link(source, PRIMARY_LINK_TYPE).await {
            Ok(link) => Ok(link),
            Err(e) => {
                // fallback mode takes the bare product id
                let fallback = product_id_from_url(source).unwrap_or(source);
                tracing::warn!(
                    source = %source,
                    fallback = %fallback,
                    error = %e,
                    "Affiliate link generation failed, trying fallback link type"
                );
                self.request_link(fallback, FALLBACK_LINK_TYPE).await
            }
        }
    }
}

/// Public product page for an id, used when only the id is known.
pub fn product_url(product_id: &str) -> String {
    format!("https://www.aliexpress.com/item/{}.html", product_id)
}

/// Strip the query string; tracking parameters in it confuse link conversion.
pub fn clean_detail_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Product id of an `/item/<id>.html` page URL.
pub fn product_id_from_url(url: &str) -> Option<&str> {
    let (_, rest) = url.rsplit_once("/item/")?;
    let id = rest.split('.').next()?;
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then_some(id)
}

/// Walk the documented nesting path and normalize every product found.
///
/// Products without a title or a parseable price are skipped.
pub fn parse_products(body: &Value, default_currency: &str) -> Vec<Candidate> {
    let Some(node) = dig(body, PRODUCT_PATH) else {
        return Vec::new();
    };

    let items: Vec<&Value> = match node {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![node],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| parse_product(item, default_currency))
        .collect()
}

fn parse_product(item: &Value, default_currency: &str) -> Option<Candidate> {
    let title = text_field(item, &["product_title", "title"])?;
    let price = number_field(item, &["target_sale_price", "sale_price", "app_sale_price", "price"])?;

    let rating = number_field(item, &["rating"])
        .or_else(|| number_field(item, &["evaluate_rate"]).map(|pct| pct / 20.0))
        .map(|r| r.clamp(0.0, 5.0));

    let popularity = number_field(item, &["lastest_volume", "volume", "popularity"])
        .filter(|v| *v >= 0.0)
        .map(|v| v as u64);

    let commission_rate = commission_field(item);

    Some(Candidate {
        id: text_field(item, &["product_id", "id"]),
        title,
        price,
        currency: text_field(
            item,
            &["target_sale_price_currency", "sale_price_currency", "currency"],
        )
        .unwrap_or_else(|| default_currency.to_string()),
        image_url: text_field(item, &["product_main_image_url", "image", "image_url"])
            .unwrap_or_default(),
        detail_url: text_field(item, &["product_detail_url", "detail_url"]),
        rating,
        popularity,
        commission_rate,
    })
}

/// `promotion_link` is either an array of link objects or a single object.
pub fn extract_promotion_link(body: &Value) -> Option<String> {
    let node = dig(body, LINK_PATH)?;
    let first = match node {
        Value::Array(items) => items.first()?,
        other => other,
    };
    text_field(first, &["promotion_link"])
}

fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(key))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// First non-empty field among `names`, accepting string or number encodings.
fn text_field(item: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match item.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First numeric field among `names`. Strings like "12.50", "1,024" or "95.5%" are accepted.
fn number_field(item: &Value, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| match item.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Commission as a fraction: "7.0%" and 7.0 both become 0.07, 0.07 stays.
fn commission_field(item: &Value) -> Option<f64> {
    let raw = item.get("commission_rate")?;
    let is_percent = matches!(raw, Value::String(s) if s.trim().ends_with('%'));
    let value = number_field(item, &["commission_rate"])?;
    if is_percent || value > 1.0 {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn product_response(products: Value) -> Value {
        json!({
            "aliexpress_affiliate_product_query_response": {
                "resp_result": {
                    "resp_code": 200,
                    "result": {
                        "current_record_count": 2,
                        "products": { "product": products }
                    }
                }
            }
        })
    }

    fn link_response(links: Value) -> Value {
        json!({
            "aliexpress_affiliate_link_generate_response": {
                "resp_result": {
                    "resp_code": 200,
                    "result": { "promotion_links": { "promotion_link": links } }
                }
            }
        })
    }

    fn test_config(base_url: String) -> CatalogConfig {
        CatalogConfig {
            base_url,
            app_key: Some("test-key".to_string()),
            app_secret: Some("test-secret".to_string()),
            ..CatalogConfig::default()
        }
    }

    fn search_params(keywords: &str) -> SearchParams {
        SearchParams {
            keywords: keywords.to_string(),
            ship_to: "US".to_string(),
            page_size: 20,
            page_no: 1,
            currency: "USD".to_string(),
            language: "EN".to_string(),
            price_min: None,
            price_max: None,
            delivery_days: None,
            sort: None,
        }
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = CatalogConfig {
            app_key: Some("k".to_string()),
            app_secret: Some("  ".to_string()),
            ..CatalogConfig::default()
        };
        assert!(matches!(
            AliExpressClient::new(&config),
            Err(CatalogError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_parse_products_normalizes_fields() {
        let body = product_response(json!([
            {
                "product_id": 1005001,
                "product_title": "TWS Earbuds ANC Wireless",
                "target_sale_price": "19.99",
                "target_sale_price_currency": "USD",
                "product_main_image_url": "https://img/1.jpg",
                "product_detail_url": "https://www.aliexpress.com/item/1005001.html?aff=x",
                "evaluate_rate": "96.0%",
                "lastest_volume": 1520,
                "commission_rate": "7.0%"
            },
            {
                "product_title": "No price listing"
            }
        ]));

        let products = parse_products(&body, "USD");
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.id.as_deref(), Some("1005001"));
        assert_eq!(p.price, 19.99);
        assert!((p.rating.unwrap() - 4.8).abs() < 1e-9);
        assert_eq!(p.popularity, Some(1520));
        assert!((p.commission_rate.unwrap() - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_parse_products_missing_nesting_is_empty() {
        let body = json!({
            "aliexpress_affiliate_product_query_response": {
                "resp_result": { "resp_code": 405, "resp_msg": "No results" }
            }
        });
        assert!(parse_products(&body, "USD").is_empty());
        assert!(parse_products(&json!({}), "USD").is_empty());
    }

    #[test]
    fn test_parse_products_single_object() {
        let body = product_response(json!({
            "product_title": "Power Bank 20000mAh",
            "sale_price": 12.5,
            "rating": 4.2
        }));
        let products = parse_products(&body, "EUR");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].currency, "EUR");
        assert_eq!(products[0].rating, Some(4.2));
        assert!(products[0].id.is_none());
    }

    #[test]
    fn test_extract_promotion_link_array_and_object() {
        let arr = link_response(json!([{ "promotion_link": "https://s.click/a" }]));
        assert_eq!(extract_promotion_link(&arr).as_deref(), Some("https://s.click/a"));

        let obj = link_response(json!({ "promotion_link": "https://s.click/b" }));
        assert_eq!(extract_promotion_link(&obj).as_deref(), Some("https://s.click/b"));

        assert!(extract_promotion_link(&link_response(json!([]))).is_none());
    }

    #[test]
    fn test_clean_detail_url() {
        assert_eq!(
            clean_detail_url("https://www.aliexpress.com/item/1.html?spm=abc"),
            "https://www.aliexpress.com/item/1.html"
        );
        assert_eq!(clean_detail_url("https://x/item/2.html"), "https://x/item/2.html");
    }

    #[test]
    fn test_product_id_from_url() {
        assert_eq!(product_id_from_url("https://www.aliexpress.com/item/1005006.html"), Some("1005006"));
        assert_eq!(product_id_from_url(&product_url("42")), Some("42"));
        assert_eq!(product_id_from_url("https://www.aliexpress.com/store/9"), None);
        assert_eq!(product_id_from_url("https://x/item/abc.html"), None);
    }

    #[tokio::test]
    async fn test_search_sends_signed_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sync"))
            .and(query_param("method", PRODUCT_QUERY_METHOD))
            .and(query_param("keywords", "airpods"))
            .and(query_param("app_key", "test-key"))
            .and(query_param("sign_method", "md5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_response(json!([
                { "product_id": "1", "product_title": "TWS Earbuds", "target_sale_price": "9.90" }
            ]))))
            .expect(1)
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(format!("{}/sync", server.uri()))).unwrap();
        let page = client.search(&search_params("airpods")).await.unwrap();

        assert_eq!(page.candidates.len(), 1);
        assert!(page.raw.get("aliexpress_affiliate_product_query_response").is_some());

        let requests = server.received_requests().await.unwrap();
        let url = &requests[0].url;
        assert!(url.query_pairs().any(|(k, v)| k == "sign" && v.len() == 32));
        assert!(!url.query_pairs().any(|(k, _)| k == "min_sale_price"));
    }

    #[tokio::test]
    async fn test_search_non_2xx_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(server.uri())).unwrap();
        let err = client.search(&search_params("x")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_search_error_envelope_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error_response": { "code": "IncompleteSignature", "msg": "The request signature does not conform" }
            })))
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(server.uri())).unwrap();
        let err = client.search(&search_params("x")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Rejected { ref code, .. } if code == "IncompleteSignature"));
    }

    #[tokio::test]
    async fn test_search_empty_body_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(server.uri())).unwrap();
        let page = client.search(&search_params("x")).await.unwrap();
        assert!(page.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_generate_link_falls_back_to_second_link_type() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("method", LINK_GENERATE_METHOD))
            .and(query_param("promotion_link_type", PRIMARY_LINK_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(link_response(json!([]))))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("method", LINK_GENERATE_METHOD))
            .and(query_param("promotion_link_type", FALLBACK_LINK_TYPE))
            .and(query_param("source_values", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(link_response(json!({
                "promotion_link": "https://s.click.aliexpress.com/e/_fallback"
            }))))
            .expect(1)
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(server.uri())).unwrap();
        let link = client
            .generate_link("https://www.aliexpress.com/item/7.html?spm=tracking")
            .await
            .unwrap();
        assert_eq!(link, "https://s.click.aliexpress.com/e/_fallback");
    }

    #[tokio::test]
    async fn test_generate_link_gives_up_after_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(server.uri())).unwrap();
        assert!(client.generate_link(&product_url("9")).await.is_err());
    }

    #[tokio::test]
    async fn test_generate_link_empty_result_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(link_response(json!([]))))
            .expect(2)
            .mount(&server)
            .await;

        let client = AliExpressClient::new(&test_config(server.uri())).unwrap();
        let err = client.generate_link(&product_url("9")).await.unwrap_err();
        match &err {
            CatalogError::NoLink { source_value, raw } => {
                assert_eq!(source_value, "9");
                assert!(raw.get("aliexpress_affiliate_link_generate_response").is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.raw().is_some());
    }
}
