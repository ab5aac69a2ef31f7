//! Gadget templates and payload generation.
//!
//! A [`Catalog`] holds serialized gadget templates and helper class templates. It is
//! built once by the caller and passed by reference wherever payloads are generated;
//! there is no global registry.
//!
//! Gadget templates are serialization streams containing `{{param0}}`, `{{param1}}`,
//! ... placeholders, one per declared [`ParamSpec`] in declaration order. Text
//! parameters replace String nodes; byte parameters replace `byte[]` nodes whose
//! content is the placeholder text.
//!
//! # Examples
//!
//! ```rust,ignore
//! use jgadget::gadget::{Catalog, GadgetTemplate, ParamSpec, ParamValue, Params};
//!
//! let mut catalog = Catalog::new();
//! catalog.register_gadget(GadgetTemplate::new("URLDNS", template_bytes)
//!     .with_param(ParamSpec::text("url")));
//!
//! let mut params = Params::new();
//! params.insert("url".to_string(), ParamValue::from("http://example.invalid"));
//! let payload = catalog.generate_bytes("URLDNS", &params, &Default::default())?;
//! # Ok::<(), jgadget::Error>(())
//! ```

mod templates;

pub use templates::{set_template_bytecodes, BYTECODES_FIELD, TEMPLATES_IMPL};

use std::{collections::HashMap, path::Path};

use log::debug;
use rayon::prelude::*;

use crate::{
    classfile::{patch_class_or_descriptor_name, patch_placeholder_command, ClassFile},
    file::File,
    serial::{self, EncodeOptions, Graph},
    Error::{self, NotFound},
    Result,
};

/// Parameter values by parameter name.
pub type Params = HashMap<String, ParamValue>;

/// Kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Replaces String nodes
    Text,
    /// Replaces `byte[]` nodes
    Bytes,
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Text value
    Text(String),
    /// Byte value
    Bytes(Vec<u8>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        ParamValue::Bytes(value)
    }
}

/// Declaration of one template parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Name used to look the value up in [`Params`]
    pub name: String,
    /// Accepted kind
    pub kind: ParamKind,
    /// Value used when the caller supplies none
    pub default: Option<ParamValue>,
}

impl ParamSpec {
    /// A required text parameter.
    #[must_use]
    pub fn text(name: &str) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Text,
            default: None,
        }
    }

    /// A required byte parameter.
    #[must_use]
    pub fn bytes(name: &str) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Bytes,
            default: None,
        }
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<ParamValue>) -> ParamSpec {
        self.default = Some(value.into());
        self
    }
}

/// How a gadget delivers code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Carrier {
    /// Parameters only
    #[default]
    Ordinary,
    /// Embeds a class in a `TemplatesImpl` object's `_bytecodes`
    TemplatesImpl,
}

/// A serialized gadget chain with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct GadgetTemplate {
    /// Catalog key
    pub name: String,
    /// Human readable description
    pub description: String,
    /// Serialization stream
    pub bytes: Vec<u8>,
    /// Parameters; the one at index N fills `{{paramN}}`
    pub params: Vec<ParamSpec>,
    /// Delivery mechanism
    pub carrier: Carrier,
}

impl GadgetTemplate {
    /// A template without parameters or description.
    #[must_use]
    pub fn new(name: &str, bytes: Vec<u8>) -> GadgetTemplate {
        GadgetTemplate {
            name: name.to_string(),
            description: String::new(),
            bytes,
            params: Vec::new(),
            carrier: Carrier::Ordinary,
        }
    }

    /// A template from the JSON form of its graph (see [`serial::to_json`]).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for JSON that is not a graph, and any
    /// encoder error.
    pub fn from_json(name: &str, json: &str) -> Result<GadgetTemplate> {
        let graph = serial::from_json(json)?;
        let bytes = serial::encode(&graph, &EncodeOptions::default())?;
        Ok(GadgetTemplate::new(name, bytes))
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_param(mut self, param: ParamSpec) -> GadgetTemplate {
        self.params.push(param);
        self
    }

    /// Set the carrier.
    #[must_use]
    pub fn with_carrier(mut self, carrier: Carrier) -> GadgetTemplate {
        self.carrier = carrier;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> GadgetTemplate {
        self.description = description.to_string();
        self
    }
}

/// A compiled helper class with a command placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTemplate {
    /// Catalog key
    pub name: String,
    /// Class file
    pub bytes: Vec<u8>,
    /// Internal name of the class (`a/b/C`)
    pub class_name: String,
    /// Utf8 constant replaced by the command
    pub placeholder: String,
}

/// One entry of [`Catalog::generate_batch`].
#[derive(Debug, Clone, Default)]
pub struct GadgetRequest {
    /// Gadget name
    pub gadget: String,
    /// Parameter values
    pub params: Params,
    /// Class injected into a `TemplatesImpl` carrier, if any
    pub class_bytes: Option<Vec<u8>>,
    /// Output encoding
    pub options: EncodeOptions,
}

/// Gadget and class templates known to the caller.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    gadgets: HashMap<String, GadgetTemplate>,
    classes: HashMap<String, ClassTemplate>,
}

fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

impl Catalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Add a gadget template, returning the one it replaces.
    pub fn register_gadget(&mut self, template: GadgetTemplate) -> Option<GadgetTemplate> {
        debug!("Registering gadget {} ({} bytes)", template.name, template.bytes.len());
        self.gadgets.insert(template.name.clone(), template)
    }

    /// Add a class template, returning the one it replaces.
    pub fn register_class(&mut self, template: ClassTemplate) -> Option<ClassTemplate> {
        debug!("Registering class template {} ({})", template.name, template.class_name);
        self.classes.insert(template.name.clone(), template)
    }

    /// Read a gadget template from disk and register it.
    ///
    /// The stream is decoded once to reject damaged templates early.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] or [`crate::Error::Empty`] if the file
    /// cannot be read, and any decoder error if it is not a valid stream.
    pub fn load_gadget(
        &mut self,
        name: &str,
        path: &Path,
        params: Vec<ParamSpec>,
        carrier: Carrier,
    ) -> Result<()> {
        let file = File::from_file(path)?;
        serial::decode(file.data())?;

        self.register_gadget(GadgetTemplate {
            name: name.to_string(),
            description: path.display().to_string(),
            bytes: file.data().to_vec(),
            params,
            carrier,
        });
        Ok(())
    }

    /// Look up a gadget template.
    #[must_use]
    pub fn gadget(&self, name: &str) -> Option<&GadgetTemplate> {
        self.gadgets.get(name)
    }

    /// Look up a class template.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassTemplate> {
        self.classes.get(name)
    }

    /// Sorted names of all registered gadgets.
    #[must_use]
    pub fn gadget_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gadgets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Decode a gadget template and fill in its parameters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown gadget, a parameter with
    /// neither a value nor a default, or a placeholder missing from the template, and
    /// [`crate::Error::Error`] when a value does not match its parameter kind.
    pub fn generate(&self, name: &str, params: &Params) -> Result<Graph> {
        let Some(template) = self.gadget(name) else {
            return Err(NotFound(format!("gadget {name}")));
        };
        let mut graph = serial::decode(&template.bytes)?;

        for (index, param) in template.params.iter().enumerate() {
            let placeholder = format!("{{{{param{index}}}}}");
            let Some(value) = params.get(&param.name).or(param.default.as_ref()) else {
                return Err(NotFound(format!("value for parameter {} of {}", param.name, name)));
            };

            let replaced = match (param.kind, value) {
                (ParamKind::Text, ParamValue::Text(text)) => {
                    serial::replace_string(&mut graph, &placeholder, text, -1)?
                }
                (ParamKind::Bytes, ParamValue::Bytes(bytes)) => {
                    serial::replace_byte_array(&mut graph, placeholder.as_bytes(), bytes, -1)?
                }
                (kind, _) => {
                    return Err(Error::Error(format!(
                        "Parameter {} of {} expects {:?}",
                        param.name, name, kind
                    )))
                }
            };
            debug!("{}: {} filled {} node(s)", name, placeholder, replaced);
        }

        Ok(graph)
    }

    /// [`Catalog::generate`] followed by [`serial::encode`].
    ///
    /// # Errors
    ///
    /// See [`Catalog::generate`] and [`serial::encode`].
    pub fn generate_bytes(&self, name: &str, params: &Params, options: &EncodeOptions) -> Result<Vec<u8>> {
        let graph = self.generate(name, params)?;
        serial::encode(&graph, options)
    }

    /// Generate a `TemplatesImpl` gadget carrying `class_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Error`] if the gadget has no `TemplatesImpl` carrier,
    /// plus everything [`Catalog::generate`] and [`set_template_bytecodes`] return.
    pub fn generate_templates(&self, name: &str, params: &Params, class_bytes: &[u8]) -> Result<Graph> {
        if let Some(template) = self.gadget(name) {
            if template.carrier != Carrier::TemplatesImpl {
                return Err(Error::Error(format!("Gadget {name} has no TemplatesImpl carrier")));
            }
        }

        let mut graph = self.generate(name, params)?;
        set_template_bytecodes(&mut graph, class_bytes)?;
        Ok(graph)
    }

    /// Patch a class template's placeholder with `command`, optionally renaming it.
    ///
    /// The result is re-parsed to check that the placeholder is gone and the class
    /// carries the requested name. `new_class_name` may be dotted or internal.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown template and
    /// [`crate::Error::Malformed`] if the patched class does not verify.
    pub fn render_class(&self, name: &str, command: &str, new_class_name: Option<&str>) -> Result<Vec<u8>> {
        let Some(template) = self.class(name) else {
            return Err(NotFound(format!("class template {name}")));
        };

        let mut bytes = patch_placeholder_command(&template.bytes, &template.placeholder, command);
        let new_class_name = new_class_name.map(internal_name);
        if let Some(new) = &new_class_name {
            bytes = patch_class_or_descriptor_name(&bytes, &template.class_name, new);
        }

        let class = ClassFile::parse(&bytes)?;
        if command != template.placeholder
            && class
                .utf8_constants()
                .any(|(_, text)| text == template.placeholder)
        {
            return Err(malformed_error!(
                "Placeholder {:?} still present in {}",
                template.placeholder,
                name
            ));
        }
        if let Some(new) = &new_class_name {
            if class.class_name() != Some(new.as_str()) {
                return Err(malformed_error!(
                    "Class {} was not renamed to {}",
                    template.class_name,
                    new
                ));
            }
        }

        Ok(bytes)
    }

    fn generate_request(&self, request: &GadgetRequest) -> Result<Vec<u8>> {
        let graph = match &request.class_bytes {
            Some(class_bytes) => self.generate_templates(&request.gadget, &request.params, class_bytes)?,
            None => self.generate(&request.gadget, &request.params)?,
        };
        serial::encode(&graph, &request.options)
    }

    /// Generate and encode independent payloads in parallel.
    ///
    /// Results come back in request order; one failing request does not affect the
    /// others.
    #[must_use]
    pub fn generate_batch(&self, requests: &[GadgetRequest]) -> Vec<Result<Vec<u8>>> {
        requests
            .par_iter()
            .map(|request| self.generate_request(request))
            .collect()
    }
}
