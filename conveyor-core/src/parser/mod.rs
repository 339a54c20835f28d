use crate::document::PipelineDocument;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Auto,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub document: PipelineDocument,
    pub format: DocumentFormat,
}

pub fn parse_document_str(input: &str, format: DocumentFormat) -> Result<ParsedDocument, ParseError> {
    match format {
        DocumentFormat::Json => Ok(ParsedDocument {
            document: serde_json::from_str(input)?,
            format,
        }),
        DocumentFormat::Yaml => Ok(ParsedDocument {
            document: serde_yaml::from_str(input)?,
            format,
        }),
        DocumentFormat::Auto => parse_document_auto(input),
    }
}

fn parse_document_auto(input: &str) -> Result<ParsedDocument, ParseError> {
    // JSON always starts with `{` after trimming; YAML is a superset otherwise.
    if input.trim_start().starts_with('{') {
        return match serde_json::from_str::<PipelineDocument>(input) {
            Ok(document) => Ok(ParsedDocument {
                document,
                format: DocumentFormat::Json,
            }),
            Err(e) => serde_yaml::from_str::<PipelineDocument>(input)
                .map(|document| ParsedDocument {
                    document,
                    format: DocumentFormat::Yaml,
                })
                .map_err(|_| ParseError::Json(e)),
        };
    }

    serde_yaml::from_str::<PipelineDocument>(input)
        .map(|document| ParsedDocument {
            document,
            format: DocumentFormat::Yaml,
        })
        .map_err(ParseError::Yaml)
}
