use domain_vectorization::VectorizationApiDoc;
use utoipa::OpenApi;

/// Root OpenAPI document, with the vectorization API mounted at its route prefix
#[derive(OpenApi)]
#[openapi(
    info(title = "MedBot Vectorizer API"),
    nest((path = "/api/vectorization", api = VectorizationApiDoc))
)]
pub struct ApiDoc;
