//! Content sharing. Fire-and-forget: the native layer reports nothing back.

use super::{Dispatch, OneShot};
use crate::bridge::BridgeHandle;
use crate::error::Result;
use crate::receiver::ValueKind;
use log::warn;
use native_layer::{Capability, NativeRequest, ShareConfig, ShareFile, ShareKind};

pub struct ShareCommand {
    handle: BridgeHandle,
    shot: OneShot<ShareConfig>,
}

impl ShareCommand {
    pub(crate) fn new(handle: BridgeHandle) -> Self {
        Self {
            handle,
            shot: OneShot::new(Capability::Share, ShareConfig::default()),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.shot.edit(|c| c.message = message);
        self
    }

    /// Title of the share chooser.
    pub fn header(mut self, header: impl Into<String>) -> Self {
        let header = header.into();
        self.shot.edit(|c| c.header = Some(header));
        self
    }

    /// Attach a file by path.
    pub fn file(self, path: impl Into<String>) -> Self {
        self.attach(ShareFile::Path(path.into()))
    }

    /// Attach a file by content URI.
    pub fn file_uri(self, uri: impl Into<String>) -> Self {
        self.attach(ShareFile::Uri(uri.into()))
    }

    fn attach(mut self, file: ShareFile) -> Self {
        self.shot.edit(|c| {
            c.files.push(file);
            if c.kind == ShareKind::Text {
                c.kind = ShareKind::Files;
            }
        });
        self
    }

    /// Share through WhatsApp, optionally straight to one phone number.
    pub fn whatsapp(mut self, phone: Option<String>) -> Self {
        self.shot.edit(|c| c.kind = ShareKind::WhatsApp { phone });
        self
    }

    /// Share as an e-mail.
    pub fn email(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        self.shot.edit(|c| {
            c.kind = ShareKind::Email {
                subject,
                html: false,
                to: Vec::new(),
                cc: Vec::new(),
                bcc: Vec::new(),
            }
        });
        self
    }

    pub fn to(self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.email_field(|to, _, _, _| to.push(address))
    }

    pub fn cc(self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.email_field(|_, cc, _, _| cc.push(address))
    }

    pub fn bcc(self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.email_field(|_, _, bcc, _| bcc.push(address))
    }

    /// Send the message body as HTML.
    pub fn html(self, html: bool) -> Self {
        self.email_field(|_, _, _, flag| *flag = html)
    }

    fn email_field(
        mut self,
        f: impl FnOnce(&mut Vec<String>, &mut Vec<String>, &mut Vec<String>, &mut bool),
    ) -> Self {
        self.shot.edit(|c| match &mut c.kind {
            ShareKind::Email {
                to, cc, bcc, html, ..
            } => f(to, cc, bcc, html),
            _ => warn!("E-mail option set on a non e-mail share, ignored"),
        });
        self
    }

    /// Hand the content to the platform share sheet.
    pub fn send(&mut self) -> Result<Dispatch> {
        let config = self.shot.take(ShareConfig::validate)?;
        self.handle.fire(NativeRequest::Share(config), ValueKind::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeRoot;
    use crate::error::BridgeError;
    use crate::token::OperationState;
    use native_layer::simulated::SimulatedBackend;

    #[test]
    fn email_needs_valid_recipients() {
        let root = BridgeRoot::new();
        let handle = root.install(None);
        let mut command = handle
            .share()
            .message("Report attached")
            .email("Weekly report")
            .to("team@example.com")
            .cc("not-an-address");
        assert!(matches!(
            command.send(),
            Err(BridgeError::InvalidConfig {
                capability: Capability::Share,
                ..
            })
        ));
    }

    #[test]
    fn file_share_settles_without_callback() {
        let root = BridgeRoot::new();
        let handle = root.install(Some(Box::new(SimulatedBackend::new())));
        let dispatch = handle
            .share()
            .header("Send log")
            .file("/data/log.txt")
            .file_uri("content://logs/2")
            .send()
            .unwrap();
        assert_eq!(
            dispatch.ticket().map(|t| t.state()),
            Some(OperationState::Completed)
        );
    }
}
