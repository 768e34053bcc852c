//! Client verbs: add, find, remove
//!
//! Each verb is one round trip to the running daemon. Successful replies are
//! printed on stdout; error statuses become a non-zero exit.

use anyhow::{bail, Result};

use super::super::CliContext;
use crate::mailbox::QueueHandle;
use crate::protocol::{Reply, Status};
use crate::shared::NameServiceClient;

pub struct ClientHandler<'a> {
    context: &'a CliContext,
}

impl<'a> ClientHandler<'a> {
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    fn client(&self) -> NameServiceClient {
        NameServiceClient::new(self.context.config().server.listen.clone())
    }

    pub async fn handle_add(&self, name: &str, id: u32) -> Result<()> {
        let reply = self.client().add(name, QueueHandle::new(id)).await?;
        println!("{}", check(reply)?.status);
        Ok(())
    }

    pub async fn handle_find(&self, name: &str) -> Result<()> {
        let reply = check(self.client().find(name).await?)?;
        match reply.handle {
            Some(handle) => println!("{}", handle),
            None => bail!("{} without a queue id", reply.status),
        }
        Ok(())
    }

    pub async fn handle_remove(&self, name: &str) -> Result<()> {
        let reply = self.client().remove(name).await?;
        println!("{}", check(reply)?.status);
        Ok(())
    }
}

fn check(reply: Reply) -> Result<Reply> {
    if reply.status.is_error() {
        bail!("{}", reply.status);
    }
    if reply.status == Status::MsgOk {
        bail!("daemon did not recognize the request");
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_statuses() {
        assert!(check(Reply::status(Status::OkAdd)).is_ok());
        assert!(check(Reply::found(QueueHandle::new(1))).is_ok());

        let err = check(Reply::status(Status::PortExists)).unwrap_err();
        assert_eq!(err.to_string(), "ERROR_PORT_EXISTS");
        assert!(check(Reply::status(Status::Timeout)).is_err());
        assert!(check(Reply::status(Status::MsgOk)).is_err());
    }
}
