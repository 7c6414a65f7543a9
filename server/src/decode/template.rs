use dashmap::DashMap;

/// One field specifier within a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateField {
    pub field_type: u16,
    pub field_len: u16,
    /// IPFIX enterprise number when the specifier carried one.
    pub enterprise: Option<u32>,
}

/// An ordered field layout announced by an exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub template_id: u16,
    pub fields: Vec<TemplateField>,
}

impl Template {
    /// Total fixed record length implied by the field lengths.
    pub fn record_len(&self) -> usize {
        self.fields.iter().map(|f| f.field_len as usize).sum()
    }
}

/// Template retention across datagrams, keyed by
/// `(exporter identity, observation domain / source id, template id)`.
///
/// Templates are overwritten on re-announce and retained for the life of
/// the cache — no eviction. Each templated decoder family (NetFlow v9,
/// IPFIX, jFlow) owns its own cache instance; the cache is injected, not
/// process-global, so multi-sender scoping stays testable.
#[derive(Default)]
pub struct TemplateCache {
    templates: DashMap<(String, u32, u16), Template>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, exporter: &str, domain: u32, template: Template) {
        self.templates
            .insert((exporter.to_string(), domain, template.template_id), template);
    }

    pub fn get(&self, exporter: &str, domain: u32, template_id: u16) -> Option<Template> {
        self.templates
            .get(&(exporter.to_string(), domain, template_id))
            .map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
