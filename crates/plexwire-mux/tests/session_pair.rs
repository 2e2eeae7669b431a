//! Two sessions linked back to back, exchanging bytes through the
//! synchronous feed/take_outbound pair.

use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};
use plexwire_mux::{Channel, ChannelError, ChannelName, Session, SessionConfig};

fn pump(from: &Session, to: &Session) {
    for chunk in from.take_outbound() {
        to.feed(chunk).expect("feed should succeed");
    }
}

/// Deliver `from`'s outbound bytes one byte at a time.
fn trickle(from: &Session, to: &Session) {
    for chunk in from.take_outbound() {
        for i in 0..chunk.len() {
            to.feed(chunk.slice(i..i + 1)).expect("feed should succeed");
        }
    }
}

fn drain(channel: &Channel) -> (Vec<Result<Bytes, ChannelError>>, bool) {
    let mut source = channel.source();
    let mut items = Vec::new();
    loop {
        match source.next().now_or_never() {
            Some(Some(item)) => items.push(item),
            Some(None) => return (items, true),
            None => return (items, false),
        }
    }
}

#[test]
fn every_created_channel_is_accepted_in_order() {
    let a = Session::new(SessionConfig::default());
    let b = Session::new(SessionConfig::default());

    let names = ["alpha", "beta", "gamma", "delta"];
    let channels: Vec<Channel> = names
        .iter()
        .map(|name| a.create_named(*name).expect("create should succeed"))
        .collect();
    for (i, ch) in channels.iter().enumerate() {
        ch.write(format!("msg-{i}")).unwrap();
        ch.end().unwrap();
    }
    pump(&a, &b);

    for (i, name) in names.iter().enumerate() {
        let incoming = b.try_accept().expect("channel should be accepted");
        assert_eq!(incoming.name, ChannelName::from(*name));
        assert_eq!(incoming.channel.id(), i as u32);

        let (items, ended) = drain(&incoming.channel);
        assert_eq!(items, vec![Ok(Bytes::from(format!("msg-{i}")))]);
        assert!(ended);
    }
    assert!(b.try_accept().is_none());
}

#[test]
fn byte_at_a_time_delivery_matches_whole_delivery() {
    let a = Session::new(SessionConfig::default());
    let b = Session::new(SessionConfig::default());

    let ch = a.create_named("greet").unwrap();
    let payload: Vec<u8> = (0..=255u8).cycle().take(700).collect();
    ch.write(payload.clone()).unwrap();
    ch.write("").unwrap();
    ch.write("tail").unwrap();
    ch.end().unwrap();
    trickle(&a, &b);

    let incoming = b.try_accept().unwrap();
    assert_eq!(incoming.name.to_string(), "greet");
    let (items, ended) = drain(&incoming.channel);
    assert_eq!(
        items,
        vec![
            Ok(Bytes::from(payload)),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"tail")),
        ]
    );
    assert!(ended);
}

#[test]
fn both_sides_open_channels_with_the_same_id() {
    let a = Session::new(SessionConfig::default());
    let b = Session::new(SessionConfig::default());

    let from_a = a.create_named("from-a").unwrap();
    let from_b = b.create_named("from-b").unwrap();
    assert_eq!(from_a.id(), from_b.id());
    pump(&a, &b);
    pump(&b, &a);

    let at_b = b.try_accept().unwrap().channel;
    let at_a = a.try_accept().unwrap().channel;

    from_a.write("a->b").unwrap();
    from_b.write("b->a").unwrap();
    at_b.write("reply to a").unwrap();
    at_a.write("reply to b").unwrap();
    pump(&a, &b);
    pump(&b, &a);

    assert_eq!(drain(&at_b).0, vec![Ok(Bytes::from_static(b"a->b"))]);
    assert_eq!(drain(&at_a).0, vec![Ok(Bytes::from_static(b"b->a"))]);
    assert_eq!(drain(&from_a).0, vec![Ok(Bytes::from_static(b"reply to a"))]);
    assert_eq!(drain(&from_b).0, vec![Ok(Bytes::from_static(b"reply to b"))]);
}

#[test]
fn channel_error_leaves_session_and_siblings_running() {
    let a = Session::new(SessionConfig::default());
    let b = Session::new(SessionConfig::default());

    let doomed = a.create_named("doomed").unwrap();
    let healthy = a.create_named("healthy").unwrap();
    pump(&a, &b);
    let doomed_b = b.try_accept().unwrap().channel;
    let healthy_b = b.try_accept().unwrap().channel;

    doomed_b.destroy(Some("boom"));
    pump(&b, &a);
    let (items, ended) = drain(&doomed);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap_err().message(), "boom");
    assert!(ended);

    healthy.write("ok").unwrap();
    pump(&a, &b);
    assert_eq!(drain(&healthy_b).0, vec![Ok(Bytes::from_static(b"ok"))]);
    assert!(!a.is_destroyed());
    assert!(!b.is_destroyed());
}

#[test]
fn input_end_cascades_to_every_channel() {
    let a = Session::new(SessionConfig::default());
    let b = Session::new(SessionConfig::default());
    a.create_named("one").unwrap();
    a.create_named("two").unwrap();
    pump(&a, &b);
    let one = b.try_accept().unwrap().channel;
    let two = b.try_accept().unwrap().channel;

    b.end_input(None);
    assert!(b.is_destroyed());
    for ch in [one, two] {
        assert!(ch.is_destroyed());
        assert_eq!(drain(&ch), (Vec::new(), true));
    }
}
