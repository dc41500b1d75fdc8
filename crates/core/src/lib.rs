pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod policy;

pub use domain::contact::{ContactEmail, ContactField, ContactForm, FieldValue};
pub use domain::document::{CitationPolicy, DocumentName, KnowledgeDocument, SourceDescription};
pub use domain::pipe::{AgentConfiguration, ParameterSpec, ParameterType, ToolSpec};
pub use domain::retrieval::{RetrievedContext, RetrievedExcerpt};
pub use errors::{
    ApplicationError, DomainError, IngestionError, InterfaceError, LanguageCapabilityError,
    PublishError, RetrievalError, SchemaError, ToolInvocationError, ValidationError,
};
pub use flows::{ContactFlow, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState};
pub use policy::citations::CitationCatalog;
pub use policy::{AssembledInstructions, BehaviorPolicy, Persona, PolicyAssembler, RetrievalPolicy};
