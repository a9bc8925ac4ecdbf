//! Contract between the bus and externally loaded handler modules.

use super::EventBus;

/// A bundle of handlers registered and removed as a unit.
///
/// The loader calls [`register_signals`] exactly once when the module is
/// loaded and [`unregister_signals`] exactly once when it is unloaded;
/// [`EventBus::load_module`] and [`EventBus::unload_module`] enforce that per
/// module name.
///
/// [`register_signals`]: SignalModule::register_signals
/// [`unregister_signals`]: SignalModule::unregister_signals
pub trait SignalModule: Send + Sync + 'static {
    /// Unique module name.
    fn name(&self) -> &str;

    /// Subscribe handlers and install request responders.
    fn register_signals(&self, bus: &EventBus);

    /// Remove everything `register_signals` installed.
    fn unregister_signals(&self, bus: &EventBus);
}
