//! Transparent proxy composition.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::connection::Connection;

/// Wire two connections into a one-directional pipe with backpressure.
///
/// Everything `source` receives is forwarded verbatim to `dest`; when
/// `source` closes, `dest` is destroyed. Flow control couples the two in
/// the opposite direction: `dest`'s buffer filling up pauses `source`, and
/// `dest` draining resumes it, so a slow downstream peer throttles the
/// upstream read instead of growing the buffer without bound.
///
/// For a bidirectional proxy, call this twice with the roles swapped.
///
/// The wiring claims `source`'s message and close slots and `dest`'s
/// buffer-full and buffer-drain slots. No leak results from the mutual
/// references: when either side reaches its terminal state its handler
/// slots are cleared, which breaks the cycle.
pub fn pipe<S: Read + Write + 'static>(
    source: &Rc<RefCell<Connection<S>>>,
    dest: &Rc<RefCell<Connection<S>>>,
) {
    let forward_to = Rc::clone(dest);
    let destroy_on_close = Rc::clone(dest);
    let source_flow = source.borrow().flow_handle();

    {
        let mut source = source.borrow_mut();
        source.on_message(move |_source, data| {
            // A busy dest is inside its own dispatch; its teardown paths
            // make that unreachable while the pipe is intact.
            if let Ok(mut dest) = forward_to.try_borrow_mut() {
                let _ = dest.send_raw(&data);
            }
            Ok(())
        });
        source.on_close(move |_source| {
            if let Ok(mut dest) = destroy_on_close.try_borrow_mut() {
                dest.destroy();
            }
            Ok(())
        });
    }

    {
        let pause_flow = source_flow.clone();
        let mut dest = dest.borrow_mut();
        dest.on_buffer_full(move |_dest| {
            pause_flow.pause();
            Ok(())
        });
        dest.on_buffer_drain(move |_dest| {
            source_flow.resume();
            Ok(())
        });
    }
}
