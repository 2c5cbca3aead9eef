//! hickory-server adapter: maps transport requests into the forwarder's
//! entry point and streams the resulting response back out.

use bastion_dns_domain::DnsProto;
use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
use hickory_server::authority::MessageResponseBuilder;
use hickory_proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::sync::Arc;
use tracing::{debug, error};

use super::context::DnsContext;
use super::server::DnsForwarder;

pub struct ForwarderHandler {
    forwarder: Arc<DnsForwarder>,
}

impl ForwarderHandler {
    pub fn new(forwarder: Arc<DnsForwarder>) -> Self {
        Self { forwarder }
    }

    fn proto_tag(protocol: Protocol) -> DnsProto {
        match protocol {
            Protocol::Udp => DnsProto::Udp,
            Protocol::Tcp => DnsProto::Tcp,
            Protocol::Tls => DnsProto::Tls,
            Protocol::Https => DnsProto::Https,
            Protocol::Quic => DnsProto::Quic,
            _ => DnsProto::Udp,
        }
    }

    /// Rebuild an owned wire message from the transport request.
    fn owned_request(request: &Request) -> Option<Message> {
        let query = request.request_info().ok()?.query.original().clone();
        let mut msg = Message::new(request.id(), MessageType::Query, OpCode::Query);
        msg.set_recursion_desired(request.recursion_desired());
        msg.set_authentic_data(request.header().authentic_data());
        msg.add_query(query);
        if let Some(edns) = request.edns() {
            msg.set_edns(edns.clone());
        }
        Some(msg)
    }

    async fn send<R: ResponseHandler>(
        &self,
        request: &Request,
        response: &Message,
        mut response_handle: R,
    ) -> ResponseInfo {
        let builder = MessageResponseBuilder::from_message_request(request);
        let mut header = Header::response_from_request(request.header());
        header.set_response_code(response.response_code());
        header.set_recursion_available(true);
        header.set_authentic_data(response.authentic_data());

        let message = builder.build(
            header,
            response.answers(),
            response.name_servers(),
            &[],
            response.additionals(),
        );

        match response_handle.send_response(message).await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "failed to send response");
                serve_failed_header(request)
            }
        }
    }

    async fn refuse<R: ResponseHandler>(
        &self,
        request: &Request,
        code: ResponseCode,
        mut response_handle: R,
    ) -> ResponseInfo {
        let builder = MessageResponseBuilder::from_message_request(request);
        match response_handle
            .send_response(builder.error_msg(request.header(), code))
            .await
        {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "failed to send error response");
                serve_failed_header(request)
            }
        }
    }
}

fn serve_failed_header(request: &Request) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(ResponseCode::ServFail);
    ResponseInfo::from(header)
}

#[async_trait::async_trait]
impl RequestHandler for ForwarderHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
            return self
                .refuse(request, ResponseCode::NotImp, response_handle)
                .await;
        }

        let Some(message) = Self::owned_request(request) else {
            return self
                .refuse(request, ResponseCode::FormErr, response_handle)
                .await;
        };

        let mut ctx = DnsContext::new(
            message,
            request.src(),
            Self::proto_tag(request.protocol()),
        );

        match self.forwarder.handle(&mut ctx).await {
            Ok(()) => match &ctx.response {
                Some(response) => self.send(request, response, response_handle).await,
                None => {
                    debug!("pipeline produced no response");
                    self.refuse(request, ResponseCode::ServFail, response_handle)
                        .await
                }
            },
            Err(e) => {
                debug!(error = %e, "request failed");
                self.refuse(request, ResponseCode::ServFail, response_handle)
                    .await
            }
        }
    }
}
