mod rules;
mod validator;

use crate::document::PipelineDocument;
use crate::error::ValidationError;
use validator::Validator;

pub(crate) use validator::is_valid_id;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for PipelineDocument {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_document(self)
    }
}

pub fn validate_document(doc: &PipelineDocument) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    v.validate_document(doc);
    v.finish()
}
