//! ACME challenge responder.
//!
//! Classifies each incoming question and synthesizes authoritative answers
//! for the challenge subdomain: SOA/NS/A/AAAA from static configuration, TXT
//! from the challenge record store. Questions outside the configured zone
//! are delegated untouched to the next handler in the chain, so the primary
//! zone data is never shadowed.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use hickory_proto::op::{Header, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, NS, SOA, TXT};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tracing::{debug, error};

use crate::config::{qualify, AcmeConfig, CHALLENGE_LABEL};
use crate::provider::ChallengeProvider;

/// Domain of the certificate authority, reported as the SOA mailbox owner.
const CERTIFICATE_AUTHORITY: &str = "letsencrypt.org";

/// Fixed serial reported in synthesized SOA answers.
const SOA_SERIAL: u32 = 1;

/// SOA expire for the challenge zone; challenge tokens are short-lived.
const SOA_EXPIRE: i32 = 60;

/// SOA minimum TTL (negative caching) for the challenge zone.
const SOA_MINIMUM_TTL: u32 = 60;

/// DNS handler answering for `_acme-challenge.<domain>.` and delegating
/// everything else to `next`.
pub struct ChallengeHandler<N> {
    next: N,
    provider: Arc<ChallengeProvider>,
    zone: LowerName,
    authoritative_ns: Name,
    soa_mbox: Name,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
}

/// What the handler decided to do with one question.
#[derive(Debug)]
enum Disposition {
    /// Question is outside the configured zone; the next handler owns it.
    Delegate,
    /// Question matched the zone but nothing is synthesized for it.
    NoAnswer,
    /// Synthesized answers to write back, marked authoritative.
    Answer(Vec<Record>),
}

impl<N: RequestHandler> ChallengeHandler<N> {
    /// Build a handler for the configured domain.
    ///
    /// `next` receives every question that does not match the configured
    /// zone; in production that is the catalog serving the primary zones.
    pub fn new(
        config: &AcmeConfig,
        provider: Arc<ChallengeProvider>,
        next: N,
    ) -> crate::Result<Self> {
        let zone_name = Name::parse(&config.qualified_domain(), None).map_err(|e| {
            crate::AcmeSrvError::Zone(format!("invalid domain '{}': {e}", config.domain))
        })?;
        let authoritative_ns = match config.authoritative_nameserver.host.as_deref() {
            Some(host) if !host.is_empty() => Name::parse(&qualify(host), None).map_err(|e| {
                crate::AcmeSrvError::Zone(format!("invalid nameserver host '{host}': {e}"))
            })?,
            // Address-only configuration: the domain reports itself as its
            // own nameserver and the A/AAAA answers resolve it.
            _ => zone_name.clone(),
        };
        let soa_mbox = Name::parse(&qualify(CERTIFICATE_AUTHORITY), None)
            .map_err(|e| crate::AcmeSrvError::Zone(format!("invalid SOA mailbox: {e}")))?;

        Ok(Self {
            next,
            provider,
            zone: LowerName::from(&zone_name),
            authoritative_ns,
            soa_mbox,
            ipv4: config.authoritative_nameserver.ipv4,
            ipv6: config.authoritative_nameserver.ipv6,
        })
    }

    /// Decide how to answer one question.
    fn classify(
        &self,
        name: &LowerName,
        qtype: RecordType,
        class: DNSClass,
    ) -> crate::Result<Disposition> {
        if !self.zone.zone_of(name) {
            return Ok(Disposition::Delegate);
        }

        let qname = Name::from(name);
        if !is_challenge_name(&qname) {
            // Inside the zone but not a challenge name: nothing to say.
            return Ok(Disposition::NoAnswer);
        }

        let answers = match qtype {
            RecordType::SOA => vec![self.soa_record(&qname, class)],
            RecordType::NS => vec![self.ns_record(&qname, class)],
            RecordType::TXT => self.txt_records(&qname, class)?,
            RecordType::A => self
                .ipv4
                .map(|ip| address_record(&qname, class, RData::A(A::from(ip))))
                .into_iter()
                .collect(),
            RecordType::AAAA => self
                .ipv6
                .map(|ip| address_record(&qname, class, RData::AAAA(AAAA::from(ip))))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };

        if answers.is_empty() {
            Ok(Disposition::NoAnswer)
        } else {
            Ok(Disposition::Answer(answers))
        }
    }

    /// Synthesize the challenge zone's SOA.
    fn soa_record(&self, qname: &Name, class: DNSClass) -> Record {
        let soa = SOA::new(
            self.authoritative_ns.clone(),
            self.soa_mbox.clone(),
            SOA_SERIAL,
            0,
            0,
            SOA_EXPIRE,
            SOA_MINIMUM_TTL,
        );
        let mut record = Record::from_rdata(qname.clone(), 0, RData::SOA(soa));
        record.set_dns_class(class);
        record
    }

    /// Synthesize the NS record naming the authoritative nameserver.
    fn ns_record(&self, qname: &Name, class: DNSClass) -> Record {
        let mut record = Record::from_rdata(
            qname.clone(),
            0,
            RData::NS(NS(self.authoritative_ns.clone())),
        );
        record.set_dns_class(class);
        record
    }

    /// Synthesize one TXT answer per staged record, copying data and TTL.
    ///
    /// A store miss fails the whole request; no partial answer is written.
    fn txt_records(&self, qname: &Name, class: DNSClass) -> crate::Result<Vec<Record>> {
        let staged = self.provider.get(&qname.to_string())?;
        Ok(staged
            .iter()
            .map(|staged_record| {
                let ttl = u32::try_from(staged_record.ttl.as_secs()).unwrap_or(u32::MAX);
                let mut record = Record::from_rdata(
                    qname.clone(),
                    ttl,
                    RData::TXT(TXT::new(vec![staged_record.data.clone()])),
                );
                record.set_dns_class(class);
                record
            })
            .collect())
    }

    /// Write synthesized answers as an authoritative reply.
    async fn send_answers<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        answers: &[Record],
    ) -> ResponseInfo {
        let builder = MessageResponseBuilder::from_message_request(request);
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        let response = builder.build(header, answers.iter(), &[], &[], &[]);
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!("error writing DNS response: {e}");
                serve_failed()
            }
        }
    }

    /// Report a failed request to the client.
    async fn send_error<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.error_msg(request.header(), ResponseCode::ServFail);
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!("error writing DNS error response: {e}");
                serve_failed()
            }
        }
    }
}

#[async_trait::async_trait]
impl<N: RequestHandler> RequestHandler for ChallengeHandler<N> {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        let (name, qtype, class) = {
            let info = match request.request_info() {
                Ok(info) => info,
                Err(e) => {
                    error!("invalid DNS request: {e}");
                    return self.send_error(request, response_handle).await;
                }
            };
            (
                info.query.name().clone(),
                info.query.query_type(),
                info.query.query_class(),
            )
        };
        debug!(query = %name, r#type = %qtype, "dns question");

        match self.classify(&name, qtype, class) {
            Ok(Disposition::Delegate) => {
                debug!(query = %name, "question outside challenge zone, delegating");
                self.next.handle_request(request, response_handle).await
            }
            Ok(Disposition::NoAnswer) => {
                // Matched the zone but synthesized nothing; no response is
                // written by this handler.
                debug!(query = %name, r#type = %qtype, "no challenge answer synthesized");
                ResponseInfo::from(Header::response_from_request(request.header()))
            }
            Ok(Disposition::Answer(answers)) => {
                debug!(query = %name, answers = answers.len(), "answering challenge question");
                self.send_answers(request, response_handle, &answers).await
            }
            Err(e) => {
                error!(query = %name, "error solving DNS challenge: {e}");
                self.send_error(request, response_handle).await
            }
        }
    }
}

/// True when the first label of `name` is the challenge label.
fn is_challenge_name(name: &Name) -> bool {
    name.iter()
        .next()
        .is_some_and(|label| label.eq_ignore_ascii_case(CHALLENGE_LABEL.as_bytes()))
}

fn address_record(qname: &Name, class: DNSClass, rdata: RData) -> Record {
    let mut record = Record::from_rdata(qname.clone(), 0, rdata);
    record.set_dns_class(class);
    record
}

/// Fallback response info when even the error reply cannot be written.
fn serve_failed() -> ResponseInfo {
    let mut header = Header::new();
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}
