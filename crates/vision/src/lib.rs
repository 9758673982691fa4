pub mod error;
pub mod llm;
pub mod prompt;
pub mod schema;

pub use error::ModelError;
pub use llm::{GenerationSettings, MultimodalModel, VertexClient, VertexConfig};
pub use prompt::{compose, ComposedPayload, ContextCard};
pub use schema::{
    parse_reply, AnalysisRequest, AnalysisResponse, ComplianceValue, Grounding, ValidationError,
};
