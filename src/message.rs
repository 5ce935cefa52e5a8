use std::collections::BTreeMap;

/// Device to cloud message
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Contents of body of the message
    pub body: Vec<u8>,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) system_properties: BTreeMap<String, String>,
}

impl Message {
    /// Create with contents of body as message bytes
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// Get a builder instance for building up a message
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Message body as text, if it is valid UTF-8
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Look up a system property by its wire id, e.g. `$.ct`
    pub fn system_property(&self, wire_id: &str) -> Option<&str> {
        self.system_properties.get(wire_id).map(String::as_str)
    }

    /// Look up an application property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// System properties followed by application properties, each in key order
    pub(crate) fn topic_properties(&self) -> impl Iterator<Item = (&String, &String)> {
        self.system_properties.iter().chain(self.properties.iter())
    }
}

/// Builder for constructing Message instances
#[derive(Debug, Default)]
pub struct MessageBuilder {
    message: Option<Vec<u8>>,
    properties: BTreeMap<String, String>,
    system_properties: BTreeMap<String, String>,
}

impl MessageBuilder {
    /// Set the message body
    pub fn set_body(mut self, body: Vec<u8>) -> Self {
        self.message = Some(body);
        self
    }

    /// Set the identifier for this message
    pub fn set_message_id(self, message_id: String) -> Self {
        self.set_system_property("$.mid", message_id)
    }

    /// Set the content-type for this message, such as `text/plain`.
    /// To allow routing query on the message body, this value should be set to `application/json`
    pub fn set_content_type(self, content_type: String) -> Self {
        self.set_system_property("$.ct", content_type)
    }

    /// Set the content-encoding for this message.
    /// If the content-type is set to `application/json`, allowed values are `UTF-8`, `UTF-16`, `UTF-32`.
    pub fn set_content_encoding(self, content_encoding: String) -> Self {
        self.set_system_property("$.ce", content_encoding)
    }

    /// System properties that are user settable
    /// https://docs.microsoft.com/azure/iot-hub/iot-hub-devguide-messages-construct#system-properties-of-d2c-iot-hub-messages
    fn set_system_property(mut self, property_name: &str, value: String) -> Self {
        self.system_properties
            .insert(property_name.to_owned(), value);
        self
    }

    /// Add a message property
    pub fn add_message_property(mut self, key: String, value: String) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// Build into a message instance, with an empty body if none was set
    pub fn build(self) -> Message {
        Message {
            body: self.message.unwrap_or_default(),
            properties: self.properties,
            system_properties: self.system_properties,
        }
    }
}
