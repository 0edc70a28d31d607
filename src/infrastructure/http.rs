use crate::domain::ports::Transport;
use crate::domain::protocol::{WireBody, WireRequest, WireResponse};
use crate::error::TransportError;
use async_trait::async_trait;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// Service namespace shared by the SOAP providers.
pub const SOAP_NAMESPACE: &str = "http://tempuri.org/";

/// `reqwest`-backed transport for form, JSON and SOAP calls.
///
/// Holds a verifying and a non-verifying client; `WireRequest::verify_tls`
/// picks one per call. Any HTTP status is handed back to the protocol, only
/// connection-level failures surface as `TransportError`.
#[derive(Clone)]
pub struct HttpTransport {
    secure: Client,
    insecure: Client,
}

impl HttpTransport {
    /// Builds both clients; `timeout` applies to every call when set.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        Ok(Self {
            secure: Self::builder(timeout).build()?,
            insecure: Self::builder(timeout)
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }

    fn builder(timeout: Option<Duration>) -> reqwest::ClientBuilder {
        let builder = Client::builder();
        match timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn client(&self, verify_tls: bool) -> &Client {
        if verify_tls { &self.secure } else { &self.insecure }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        debug!(
            endpoint = %request.endpoint,
            body = request.body.kind(),
            verify_tls = request.verify_tls,
            "calling provider"
        );

        let builder = self.client(request.verify_tls).post(&request.endpoint);
        let builder = match &request.body {
            WireBody::Form(fields) => builder.form(fields),
            WireBody::Json(value) => builder.json(value),
            WireBody::Soap { operation, fields } => builder
                .header("Content-Type", "text/xml; charset=utf-8")
                .header("SOAPAction", format!("\"{SOAP_NAMESPACE}{operation}\""))
                .body(soap_envelope(operation, SOAP_NAMESPACE, fields)?),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(endpoint = %request.endpoint, status, "provider responded");
        Ok(WireResponse::new(status, body))
    }
}

/// Renders a SOAP 1.1 envelope calling `operation` with flat string arguments.
pub fn soap_envelope(
    operation: &str,
    namespace: &str,
    fields: &[(String, String)],
) -> Result<String, TransportError> {
    let mut writer = Writer::new(Vec::new());
    let mut envelope = BytesStart::new("soap:Envelope");
    envelope.push_attribute(("xmlns:soap", SOAP_ENVELOPE_NS));
    let mut call = BytesStart::new(operation);
    call.push_attribute(("xmlns", namespace));

    let mut events = vec![
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        Event::Start(envelope),
        Event::Start(BytesStart::new("soap:Body")),
        Event::Start(call),
    ];
    for (name, value) in fields {
        events.push(Event::Start(BytesStart::new(name.as_str())));
        events.push(Event::Text(BytesText::new(value)));
        events.push(Event::End(BytesEnd::new(name.as_str())));
    }
    events.push(Event::End(BytesEnd::new(operation)));
    events.push(Event::End(BytesEnd::new("soap:Body")));
    events.push(Event::End(BytesEnd::new("soap:Envelope")));

    for event in events {
        writer
            .write_event(event)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
    }
    String::from_utf8(writer.into_inner()).map_err(|e| TransportError::Encode(e.to_string()))
}
