//! Pipe composition: forwarding, teardown propagation, and end-to-end
//! backpressure with zero data loss.

mod harness;

use std::rc::Rc;

use harness::{MockStream, TestNet};
use wireloop::{pipe, Config, ConnectionOptions, ConnectionState, Interest};

fn small_dest_options(max: usize) -> ConnectionOptions {
    ConnectionOptions::new().with_config(Config::new().with_max_send_buffer_size(max))
}

#[test]
fn test_pipe_forwards_verbatim() {
    let net = TestNet::new();
    let source_stream = MockStream::new();
    let dest_stream = MockStream::new();
    let source = net.accepted(&source_stream, ConnectionOptions::new());
    let dest = net.accepted(&dest_stream, ConnectionOptions::new());
    pipe(&source, &dest);

    source_stream.push_read(b"proxy me");
    source.borrow_mut().handle_readable();

    assert_eq!(dest_stream.written(), b"proxy me".to_vec());
}

#[test]
fn test_pipe_destroys_dest_on_source_close() {
    let net = TestNet::new();
    let source_stream = MockStream::new();
    let dest_stream = MockStream::new();
    let source = net.accepted(&source_stream, ConnectionOptions::new());
    let dest = net.accepted(&dest_stream, ConnectionOptions::new());
    pipe(&source, &dest);

    source_stream.set_eof();
    source.borrow_mut().handle_readable();

    assert_eq!(source.borrow().state(), ConnectionState::Closed);
    assert_eq!(dest.borrow().state(), ConnectionState::Closed);
    assert!(net.registry.is_empty());
}

#[test]
fn test_pipe_cycle_is_broken_on_teardown() {
    let net = TestNet::new();
    let source_stream = MockStream::new();
    let dest_stream = MockStream::new();
    let source = net.accepted(&source_stream, ConnectionOptions::new());
    let dest = net.accepted(&dest_stream, ConnectionOptions::new());
    pipe(&source, &dest);

    // The wiring holds dest inside source's handlers (and vice versa for
    // flow control).
    assert!(Rc::strong_count(&dest) > 2);

    source_stream.set_eof();
    source.borrow_mut().handle_readable();
    net.event_loop.pump();

    // After teardown the handler slots are cleared; only the test and
    // nothing else holds the connections.
    assert_eq!(Rc::strong_count(&source), 1);
    assert_eq!(Rc::strong_count(&dest), 1);
}

#[test]
fn test_bidirectional_pipe_teardown_does_not_reenter() {
    let net = TestNet::new();
    let a_stream = MockStream::new();
    let b_stream = MockStream::new();
    let a = net.accepted(&a_stream, ConnectionOptions::new());
    let b = net.accepted(&b_stream, ConnectionOptions::new());
    pipe(&a, &b);
    pipe(&b, &a);

    a_stream.set_eof();
    a.borrow_mut().handle_readable();

    assert_eq!(a.borrow().state(), ConnectionState::Closed);
    assert_eq!(b.borrow().state(), ConnectionState::Closed);
    assert!(net.registry.is_empty());
}

#[test]
fn test_pipe_backpressure_pauses_and_resumes_without_loss() {
    let net = TestNet::new();
    let source_stream = MockStream::new();
    let dest_stream = MockStream::new();
    dest_stream.set_write_blocked(true);

    let source = net.accepted(&source_stream, ConnectionOptions::new());
    let dest = net.accepted(&dest_stream, small_dest_options(8));
    let source_id = source.borrow().id();
    pipe(&source, &dest);

    // More inbound data than dest's send buffer can hold.
    source_stream.push_read(b"aaaa");
    source_stream.push_read(b"bbbb");
    source_stream.push_read(b"cccc");
    source.borrow_mut().handle_readable();

    // dest's buffer crossed its threshold, which paused the source before
    // the third chunk was consumed.
    assert!(source.borrow().is_paused());
    assert!(!net.event_loop.is_registered(source_id, Interest::Readable));
    assert_eq!(dest.borrow().send_buffer_len(), 8);
    assert!(dest_stream.written().is_empty());

    // Downstream drains: source resumes and the held chunk flows through.
    dest_stream.set_write_blocked(false);
    dest.borrow_mut().handle_writable();
    assert!(!source.borrow().is_paused());
    assert!(net.event_loop.is_registered(source_id, Interest::Readable));

    net.event_loop.pump();

    assert_eq!(dest_stream.written(), b"aaaabbbbcccc".to_vec());
    assert!(dest.borrow().send_buffer_is_empty());
}

#[test]
fn test_pipe_pause_from_inside_source_dispatch() {
    // The buffer-full callback fires while the source is mid-dispatch;
    // pausing must not need to re-borrow the source.
    let net = TestNet::new();
    let source_stream = MockStream::new();
    let dest_stream = MockStream::new();
    dest_stream.set_write_blocked(true);

    let source = net.accepted(&source_stream, ConnectionOptions::new());
    let dest = net.accepted(&dest_stream, small_dest_options(2));
    pipe(&source, &dest);

    source_stream.push_read(b"overflowing");
    source.borrow_mut().handle_readable();

    assert!(source.borrow().is_paused());
    assert_eq!(dest.borrow().send_buffer_len(), 11);
}
