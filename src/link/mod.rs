//! Deep-link construction for the core banking desktop client.
//!
//! Every link has the shape `jhaXp:Instance=<instance>&Msg=<xml>`; the XML
//! message selects the screen the client opens. All functions here are pure.

/// URI scheme registered by the desktop client.
pub const SCHEME: &str = "jhaXp";

/// Country code stripped from 11-digit numbers.
pub const COUNTRY_CODE: char = '1';

/// Routing id used by the customer display link when none of the right length is given.
pub const DEFAULT_ROUTING_ID: &str = "011001276";

const NAMESPACES: &str = concat!(
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
    r#"xmlns="http://jackhenry.com/jxchange/JES/2008""#,
);

pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Normalize a North American number to its 10 significant digits.
///
/// Non-digits are dropped. An 11-digit result with a leading country code
/// loses that digit; anything else is returned as the bare digits. Never fails
/// and is idempotent.
pub fn normalize(phone_number: &str) -> String {
    let digits = digits_only(phone_number);
    if digits.len() == 11 && digits.starts_with(COUNTRY_CODE) {
        return digits[1..].to_string();
    }
    digits
}

/// Render the start-call deep link for an already normalized number.
pub fn build(routing_id: &str, instance: &str, normalized_number: &str) -> String {
    LinkBuilder::new(routing_id, instance).start_call(normalized_number)
}

/// Link parameters fixed per installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    routing_id: String,
    instance: String,
}

impl LinkBuilder {
    pub fn new(routing_id: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            routing_id: routing_id.into(),
            instance: instance.into(),
        }
    }

    pub fn routing_id(&self) -> &str {
        &self.routing_id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// `StartCallLink`: opens the caller-identification screen for a number.
    pub fn start_call(&self, number: &str) -> String {
        let routing_id = xml_escape(&self.routing_id);
        let msg = format!(
            "<StartCallLink>\
             <XPMsgRqHdr><XPHdr>\
             <ConsumerProd>Xperience</ConsumerProd>\
             <AuditUsrId>XperienceClientAgent</AuditUsrId>\
             <InstRtId>{routing_id}</InstRtId>\
             </XPHdr></XPMsgRqHdr>\
             <PhoneNum>{phone}</PhoneNum>\
             <Identifier>{routing_id}</Identifier>\
             </StartCallLink>",
            phone = digits_only(number),
        );
        self.wrap(&msg)
    }

    /// `CustSrch`: customer search by phone number.
    pub fn customer_search(&self, number: &str) -> String {
        let msg = format!(
            "<CustSrch {NAMESPACES}>\
             <XPMsgRqHdr><XPHdr><InstRtId>{routing_id}</InstRtId></XPHdr></XPMsgRqHdr>\
             <PhoneNum>{phone}</PhoneNum>\
             </CustSrch>",
            routing_id = xml_escape(&self.routing_id),
            phone = digits_only(number),
        );
        self.wrap(&msg)
    }

    /// `CRMCustDsp`: customer display by customer id.
    pub fn customer_display(&self, customer_id: &str) -> String {
        let routing_id = if self.routing_id.len() == 9 {
            self.routing_id.as_str()
        } else {
            DEFAULT_ROUTING_ID
        };
        let msg = format!(
            "<CRMCustDsp {NAMESPACES}>\
             <XPMsgRqHdr><XPHdr><InstRtId>{routing_id}</InstRtId></XPHdr></XPMsgRqHdr>\
             <CustId>{customer_id}</CustId>\
             </CRMCustDsp>",
            routing_id = xml_escape(routing_id),
            customer_id = xml_escape(customer_id.trim()),
        );
        self.wrap(&msg)
    }

    fn wrap(&self, msg: &str) -> String {
        format!("{SCHEME}:Instance={}&Msg={msg}", self.instance)
    }
}

pub(crate) fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
