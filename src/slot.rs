//! Single-assignment future holding the declaration of an object.

use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, Either, Shared};
use futures::FutureExt;

use crate::error::ResolveError;
use crate::resolve::FactoryDeclaration;

/// Eventual declaration of an object, shared by every waiter
pub type DeclarationFuture = Shared<BoxFuture<'static, Result<Arc<FactoryDeclaration>, ResolveError>>>;

type Outcome = Result<Arc<FactoryDeclaration>, ResolveError>;

/// Write half of a slot.
///
/// The first resolution wins, later ones are refused.
#[derive(Clone)]
pub(crate) struct SlotSender {
    name: Arc<str>,
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl SlotSender {
    /// Settle the slot. Returns false if it was already settled.
    pub(crate) fn settle(&self, outcome: Outcome) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        match tx {
            // the receiving half lives as long as the slot's future, a failed send is harmless
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

/// Declaration slot of a single name.
///
/// Starts empty and settles exactly once: fulfilled by a matching declaration,
/// or rejected when the load that should have provided it fails.
pub struct DeclarationSlot {
    sender: SlotSender,
    future: DeclarationFuture,
}

impl DeclarationSlot {
    /// Create an empty slot.
    ///
    /// The driver built from the write half of the slot is the load expected to settle it.
    /// It starts when the slot is first awaited and runs at most once, whatever the number
    /// of waiters. Waiters see the outcome as soon as the slot settles, even while the
    /// driver is still running.
    pub(crate) fn pending<D, F>(name: &str, make_driver: F) -> Self
    where
        F: FnOnce(SlotSender) -> D,
        D: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Outcome>();
        let sender = SlotSender {
            name: Arc::from(name),
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        let driver = make_driver(sender.clone()).boxed();
        let owner = name.to_string();
        let future = async move {
            // a declaration settling the slot ends the wait, the load is then dropped
            let outcome = match future::select(driver, rx).await {
                Either::Left(((), rx)) => rx.await,
                Either::Right((outcome, _)) => outcome,
            };
            outcome.unwrap_or_else(|_| Err(ResolveError::Abandoned { name: owner }))
        }
        .boxed()
        .shared();
        Self { sender, future }
    }

    /// Create a slot that is already fulfilled with a declaration
    pub(crate) fn fulfilled(declaration: Arc<FactoryDeclaration>) -> Self {
        let slot = Self::pending(declaration.name(), |_| async {});
        slot.settle(Ok(declaration));
        slot
    }

    pub fn name(&self) -> &str {
        self.sender.name()
    }

    /// Whether the slot was already fulfilled or rejected
    pub fn is_settled(&self) -> bool {
        self.sender.is_settled()
    }

    pub(crate) fn settle(&self, outcome: Outcome) -> bool {
        self.sender.settle(outcome)
    }

    pub fn future(&self) -> DeclarationFuture {
        self.future.clone()
    }
}
