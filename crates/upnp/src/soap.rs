use std::fmt::Write;

use anyhow::Context;
use quick_xml::events::Event;
use reqwest::Client;
use tracing::{debug, trace};
use url::Url;

/// The `UPnPError` detail of a SOAP fault returned by a control endpoint.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("UPnP error {code}: {description}")]
pub struct UpnpFault {
    pub code: u16,
    pub description: String,
}

pub fn make_soap_envelope(service_type: &str, action: &str, args: &[(&str, String)]) -> String {
    let mut arguments = String::new();
    for (name, value) in args {
        let value = quick_xml::escape::escape(value.as_str());
        let _ = write!(arguments, "<{name}>{value}</{name}>");
    }
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>
<u:{action} xmlns:u="{service_type}">{arguments}</u:{action}>
</s:Body>
</s:Envelope>
"#
    )
}

pub fn parse_upnp_fault(body: &str) -> Option<UpnpFault> {
    enum Field {
        Code,
        Description,
    }

    let mut reader = quick_xml::Reader::from_str(body);
    let mut field = None;
    let mut code = None;
    let mut description = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = match e.local_name().as_ref() {
                    b"errorCode" => Some(Field::Code),
                    b"errorDescription" => Some(Field::Description),
                    _ => None,
                }
            }
            Ok(Event::Text(t)) => match field {
                Some(Field::Code) => code = std::str::from_utf8(&t).ok()?.trim().parse().ok(),
                Some(Field::Description) => description.push_str(String::from_utf8_lossy(&t).trim()),
                None => {}
            },
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                trace!("error reading SOAP fault: {e}");
                return None;
            }
            _ => {}
        }
    }

    Some(UpnpFault {
        code: code?,
        description,
    })
}

/// POSTs one control action and returns the response body of a successful call.
pub async fn call_action(
    client: &Client,
    control_url: &Url,
    service_type: &str,
    action: &str,
    args: &[(&str, String)],
    log_exchanges: bool,
) -> anyhow::Result<String> {
    let request_body = make_soap_envelope(service_type, action, args);
    if log_exchanges {
        debug!(%control_url, action, body = request_body, "SOAP request");
    }

    let response = client
        .post(control_url.clone())
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("SOAPAction", format!("\"{service_type}#{action}\""))
        .body(request_body)
        .send()
        .await
        .context("error sending")?;

    let status = response.status();

    let response_text = response
        .text()
        .await
        .context("error reading response text")?;

    if log_exchanges {
        debug!(%status, body = response_text, "SOAP response");
    } else {
        trace!(%status, text = response_text, "{action} response");
    }

    if !status.is_success() {
        return Err(match parse_upnp_fault(&response_text) {
            Some(fault) => anyhow::Error::new(fault).context(format!("{action} failed: {status}")),
            None => anyhow::anyhow!("{action} failed: {status}"),
        });
    }
    Ok(response_text)
}
