//! Container runtime handle
//!
//! Shared by the service manager and every hosted service: the container's
//! property set, the shutdown signal, and object-adapter creation. The
//! communicator holds no references to services, so handing services an
//! owning handle cannot form a cycle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::adapter::{AdapterError, ObjectAdapter};
use crate::properties::{Properties, PropertyError};

pub struct Communicator {
    properties: Properties,
    shutdown_tx: watch::Sender<bool>,
    /// Bound address of each adapter created through this communicator.
    adapter_addrs: Mutex<HashMap<String, SocketAddr>>,
}

impl Communicator {
    /// Build a communicator from an argument vector.
    ///
    /// Loads any `--Ice.Config` property files, consumes the `--Ice.*` and
    /// `--IceBox.*` options, and returns the remaining arguments alongside
    /// the handle.
    pub fn init(args: &[String]) -> Result<(Arc<Self>, Vec<String>), PropertyError> {
        let mut properties = Properties::from_args(args)?;
        let residual = properties.parse_command_line_options("Ice", args.to_vec());
        let residual = properties.parse_command_line_options("IceBox", residual);
        Ok((Self::from_properties(properties), residual))
    }

    /// Build a communicator over an already-populated property set.
    pub fn from_properties(properties: Properties) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            properties,
            shutdown_tx,
            adapter_addrs: Mutex::new(HashMap::new()),
        })
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Signal shutdown. Safe to call any number of times, from any task.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Block until [`shutdown`](Self::shutdown) has been signaled.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Create an object adapter listening on the endpoint spec stored under
    /// `property`. The adapter dispatches nothing until activated.
    pub async fn create_object_adapter_from_property(
        &self,
        name: &str,
        property: &str,
    ) -> Result<ObjectAdapter, AdapterError> {
        let endpoints = self.properties.get(property);
        if endpoints.is_empty() {
            return Err(AdapterError::NoEndpoints {
                adapter: name.to_string(),
                property: property.to_string(),
            });
        }
        let adapter = ObjectAdapter::bind(name, endpoints).await?;
        self.adapter_addrs
            .lock()
            .unwrap()
            .insert(name.to_string(), adapter.local_addr());
        Ok(adapter)
    }

    /// Address an adapter created through this communicator actually bound,
    /// by adapter name. Differs from the configured endpoint when the port
    /// was 0.
    pub fn adapter_addr(&self, name: &str) -> Option<SocketAddr> {
        self.adapter_addrs.lock().unwrap().get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_init_consumes_runtime_options() {
        let (communicator, residual) = Communicator::init(&args(&[
            "--IceBox.PrintServicesReady=bundle",
            "--Alpha.mode=cli",
            "--Ice.Trace.Network=1",
        ]))
        .unwrap();

        assert_eq!(
            communicator.properties().get("IceBox.PrintServicesReady"),
            "bundle"
        );
        assert_eq!(communicator.properties().get("Ice.Trace.Network"), "1");
        // Service-addressed options are not the runtime's to consume.
        assert_eq!(residual, args(&["--Alpha.mode=cli"]));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let communicator = Communicator::from_properties(Properties::new());
        assert!(!communicator.is_shutdown());

        communicator.shutdown();
        communicator.shutdown();
        assert!(communicator.is_shutdown());

        // Must not block once signaled.
        communicator.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_wakes_waiter() {
        let communicator = Communicator::from_properties(Properties::new());
        let waiter = {
            let communicator = Arc::clone(&communicator);
            tokio::spawn(async move { communicator.wait_for_shutdown().await })
        };
        communicator.shutdown();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_adapter_addr_recorded() {
        let mut properties = Properties::new();
        properties.set("IceBox.ServiceManager.Endpoints", "tcp -h 127.0.0.1 -p 0");
        let communicator = Communicator::from_properties(properties);

        let adapter = communicator
            .create_object_adapter_from_property(
                "ServiceManagerAdapter",
                "IceBox.ServiceManager.Endpoints",
            )
            .await
            .unwrap();

        let recorded = communicator.adapter_addr("ServiceManagerAdapter").unwrap();
        assert_eq!(recorded, adapter.local_addr());
        assert_ne!(recorded.port(), 0);
        assert!(communicator.adapter_addr("NoSuchAdapter").is_none());
    }

    #[tokio::test]
    async fn test_adapter_requires_endpoint_property() {
        let communicator = Communicator::from_properties(Properties::new());
        let result = communicator
            .create_object_adapter_from_property(
                "ServiceManagerAdapter",
                "IceBox.ServiceManager.Endpoints",
            )
            .await;
        assert!(matches!(result, Err(AdapterError::NoEndpoints { .. })));
    }
}
