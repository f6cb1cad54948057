//! Static resources held in memory.

use serde::{Deserialize, Serialize};

use crate::pagination::{paginate, Page, DEFAULT_PAGE_SIZE};
use crate::provider::ResourceProvider;
use crate::types::{
    HostError, HostResult, ReadResourceResult, ResourceContent, ResourceDefinition,
    ResourceTemplateDefinition,
};

/// A resource definition plus its text body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticResource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

impl StaticResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

pub struct InMemoryResourceProvider {
    resources: Vec<StaticResource>,
    templates: Vec<ResourceTemplateDefinition>,
    page_size: usize,
}

impl InMemoryResourceProvider {
    pub fn new(resources: Vec<StaticResource>) -> Self {
        Self {
            resources,
            templates: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_templates(mut self, templates: Vec<ResourceTemplateDefinition>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<ResourceDefinition>> {
        let definitions: Vec<ResourceDefinition> =
            self.resources.iter().map(StaticResource::definition).collect();
        paginate(&definitions, cursor, self.page_size)
    }

    fn list_templates(&self, cursor: Option<&str>) -> HostResult<Page<ResourceTemplateDefinition>> {
        paginate(&self.templates, cursor, self.page_size)
    }

    fn read(&self, uri: &str) -> HostResult<ReadResourceResult> {
        let resource = self
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .ok_or_else(|| HostError::ResourceNotFound(uri.to_string()))?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContent {
                uri: resource.uri.clone(),
                mime_type: resource.mime_type.clone(),
                text: Some(resource.text.clone()),
                blob: None,
            }],
        })
    }

    fn exists(&self, uri: &str) -> bool {
        self.resources.iter().any(|r| r.uri == uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readme() -> StaticResource {
        StaticResource {
            uri: "memo://readme".to_string(),
            name: "readme".to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
            text: "hello".to_string(),
        }
    }

    #[test]
    fn test_read_known_resource() {
        let provider = InMemoryResourceProvider::new(vec![readme()]);
        let result = provider.read("memo://readme").unwrap();
        assert_eq!(result.contents[0].text.as_deref(), Some("hello"));
        assert!(provider.exists("memo://readme"));
    }

    #[test]
    fn test_read_unknown_resource() {
        let provider = InMemoryResourceProvider::new(vec![readme()]);
        assert!(matches!(
            provider.read("memo://other"),
            Err(HostError::ResourceNotFound(_))
        ));
        assert!(!provider.exists("memo://other"));
    }

    #[test]
    fn test_list_pages() {
        let mut second = readme();
        second.uri = "memo://second".to_string();
        let provider = InMemoryResourceProvider::new(vec![readme(), second]).with_page_size(1);
        let page = provider.list(None).unwrap();
        assert_eq!(page.items.len(), 1);
        let page = provider.list(page.next_cursor.as_deref()).unwrap();
        assert_eq!(page.items[0].uri, "memo://second");
        assert!(page.next_cursor.is_none());
    }
}
