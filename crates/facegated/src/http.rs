//! HTTP surface: multipart registration and identification endpoints
//! with permissive CORS.

use crate::registry::{Registry, RegistryError};
use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, App, Error, HttpResponse, HttpServer, Result as ActixResult};
use futures_util::TryStreamExt;
use std::collections::HashMap;

/// Run the HTTP server until shutdown.
pub async fn serve(bind_addr: &str, registry: Registry) -> std::io::Result<()> {
    let registry = web::Data::new(registry);

    HttpServer::new(move || {
        App::new()
            .wrap(permissive_cors())
            .app_data(registry.clone())
            .route("/register", web::post().to(register))
            .route("/detect", web::post().to(detect))
    })
    .bind(bind_addr)?
    .run()
    .await
}

/// Any origin, `POST, GET, OPTIONS`, `Content-Type`. Preflight requests
/// are answered by the middleware.
fn permissive_cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["POST", "GET", "OPTIONS"])
        .allowed_header(header::CONTENT_TYPE)
        .max_age(3600)
}

/// `POST /register` — multipart fields `image`, `name`, `condition`.
async fn register(
    registry: web::Data<Registry>,
    payload: Multipart,
) -> ActixResult<HttpResponse> {
    let form = FormData::collect(payload).await?;

    let result = async {
        let image = form.bytes("image")?;
        let name = form.text("name")?;
        let condition = form.text("condition")?;
        registry.register(image, name, condition).await
    }
    .await;

    Ok(respond(result))
}

/// `POST /detect` — multipart field `image`.
async fn detect(registry: web::Data<Registry>, payload: Multipart) -> ActixResult<HttpResponse> {
    let form = FormData::collect(payload).await?;

    let result = async {
        let image = form.bytes("image")?;
        registry.identify(image).await
    }
    .await;

    Ok(respond(result))
}

/// Map the registry outcome to the caller-visible JSON shape. Internal
/// faults are logged and surfaced as an opaque 500.
fn respond(result: Result<String, RegistryError>) -> HttpResponse {
    match result {
        Ok(message) => HttpResponse::Ok().json(serde_json::json!({ "message": message })),
        Err(err) if err.is_client_error() => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": err.to_string() }))
        }
        Err(err) => {
            tracing::error!(error = %err, "request failed");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "internal error" }))
        }
    }
}

/// Buffered multipart form fields.
struct FormData {
    fields: HashMap<String, Vec<u8>>,
}

impl FormData {
    async fn collect(mut payload: Multipart) -> Result<Self, Error> {
        let mut fields = HashMap::new();
        while let Some(mut field) = payload.try_next().await? {
            let name = field.name().map(str::to_owned);
            let mut data = Vec::new();
            while let Some(chunk) = field.try_next().await? {
                data.extend_from_slice(&chunk);
            }
            if let Some(name) = name {
                fields.insert(name, data);
            }
        }
        Ok(Self { fields })
    }

    fn bytes(&self, key: &'static str) -> Result<&[u8], RegistryError> {
        match self.fields.get(key) {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(RegistryError::MissingField(key)),
        }
    }

    fn text(&self, key: &'static str) -> Result<&str, RegistryError> {
        let raw = self
            .fields
            .get(key)
            .ok_or(RegistryError::MissingField(key))?;
        let text = std::str::from_utf8(raw)
            .map_err(|_| RegistryError::MissingField(key))?
            .trim();
        if text.is_empty() {
            return Err(RegistryError::MissingField(key));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use actix_web::http::{Method, StatusCode};
    use actix_web::test;
    use facegate_core::{Embedding, EmbeddingSource, PipelineError};
    use facegate_store::IdentityStore;
    use image::DynamicImage;
    use tempfile::TempDir;

    const DIM: usize = 4;
    const BOUNDARY: &str = "----facegate-test-boundary";

    struct StubSource(Vec<Embedding>);

    impl EmbeddingSource for StubSource {
        fn detect_and_embed(
            &mut self,
            _image: &DynamicImage,
        ) -> Result<Vec<Embedding>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    fn test_registry(dir: &TempDir, embeddings: Vec<Embedding>) -> (Registry, IdentityStore) {
        let store = IdentityStore::open(dir.path(), DIM).unwrap();
        let engine = spawn_engine(Box::new(StubSource(embeddings)));
        (Registry::new(engine, store.clone(), 0.6), store)
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::new_rgb8(8, 8)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn push_text_part(body: &mut Vec<u8>, name: &str, value: &str) {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    fn push_file_part(body: &mut Vec<u8>, name: &str, data: &[u8]) {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"face.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }

    fn finish_body(body: &mut Vec<u8>) {
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    }

    fn multipart_post(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    macro_rules! test_app {
        ($registry:expr) => {
            test::init_service(
                App::new()
                    .wrap(permissive_cors())
                    .app_data(web::Data::new($registry))
                    .route("/register", web::post().to(register))
                    .route("/detect", web::post().to(detect)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_register_returns_message() {
        let dir = TempDir::new().unwrap();
        let (registry, store) = test_registry(&dir, vec![Embedding::new(vec![0.1; DIM])]);
        let app = test_app!(registry);

        let mut body = Vec::new();
        push_file_part(&mut body, "image", &png_bytes());
        push_text_part(&mut body, "name", "alice");
        push_text_part(&mut body, "condition", "stable");
        finish_body(&mut body);

        let resp = test::call_service(&app, multipart_post("/register", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            json["message"],
            "Face registered for alice with condition stable"
        );
        assert_eq!(store.scan().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_register_missing_condition_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let (registry, store) = test_registry(&dir, vec![Embedding::new(vec![0.1; DIM])]);
        let app = test_app!(registry);

        let mut body = Vec::new();
        push_file_part(&mut body, "image", &png_bytes());
        push_text_part(&mut body, "name", "alice");
        finish_body(&mut body);

        let resp = test::call_service(&app, multipart_post("/register", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "missing required field: condition");
        assert!(store.scan().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_register_no_face_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (registry, _store) = test_registry(&dir, vec![]);
        let app = test_app!(registry);

        let mut body = Vec::new();
        push_file_part(&mut body, "image", &png_bytes());
        push_text_part(&mut body, "name", "alice");
        push_text_part(&mut body, "condition", "stable");
        finish_body(&mut body);

        let resp = test::call_service(&app, multipart_post("/register", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "no face detected");
    }

    #[actix_web::test]
    async fn test_detect_no_match_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (registry, _store) = test_registry(&dir, vec![Embedding::new(vec![0.1; DIM])]);
        let app = test_app!(registry);

        let mut body = Vec::new();
        push_file_part(&mut body, "image", &png_bytes());
        finish_body(&mut body);

        let resp = test::call_service(&app, multipart_post("/detect", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["error"], "no matching faces found");
    }

    #[actix_web::test]
    async fn test_detect_lists_matched_identity() {
        let dir = TempDir::new().unwrap();
        let probe = Embedding::new(vec![0.1, 0.2, 0.3, 0.4]);
        let (registry, store) = test_registry(&dir, vec![probe.clone()]);

        store
            .put(
                "alice",
                0,
                &facegate_core::IdentityRecord {
                    name: "alice".into(),
                    condition: "stable".into(),
                    embedding: probe,
                    registered_at: String::new(),
                },
            )
            .unwrap();

        let app = test_app!(registry);
        let mut body = Vec::new();
        push_file_part(&mut body, "image", &png_bytes());
        finish_body(&mut body);

        let resp = test::call_service(&app, multipart_post("/detect", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["message"], "Faces detected: alice (stable)");
    }

    #[actix_web::test]
    async fn test_preflight_allows_any_origin() {
        let dir = TempDir::new().unwrap();
        let (registry, _store) = test_registry(&dir, vec![]);
        let app = test_app!(registry);

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/register")
            .insert_header((header::ORIGIN, "http://example.com"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
