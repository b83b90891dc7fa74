use std::time::Duration;

use comms::event::Event;
use futures_util::future::join_all;

use crate::registry::{Delivery, RoomRegistry};

/// Deliver an event to every current member of the room, returns how many members got it.
///
/// The member list is a snapshot, so members joining or leaving during the fan-out
/// do not disturb it. Sends run concurrently and each one waits at most `send_timeout`
/// for room in the member's queue: a member that is gone or stuck is skipped and
/// everybody else still receives the event.
pub async fn broadcast(
    registry: &RoomRegistry,
    room: &str,
    event: Event,
    send_timeout: Duration,
) -> usize {
    let members = registry.members_of(room);

    if members.is_empty() {
        return 0;
    }

    let deliveries = join_all(
        members
            .iter()
            .map(|member| member.send(event.clone(), send_timeout)),
    )
    .await;

    members
        .iter()
        .zip(deliveries)
        .filter(|(member, delivery)| match delivery {
            Delivery::Delivered => true,
            Delivery::Closed => {
                // its own session is already cleaning up
                tracing::debug!(room, connection_id = member.id(), "skipped closed connection");
                false
            }
            Delivery::TimedOut => {
                tracing::warn!(
                    room,
                    connection_id = member.id(),
                    timeout = ?send_timeout,
                    "dropped event for slow connection"
                );
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_sender_receives_its_own_message() {
        let registry = RoomRegistry::new();
        let (alice, mut alice_rx) = ConnectionHandle::new(8);
        let (bob, mut bob_rx) = ConnectionHandle::new(8);
        registry.join("lobby", alice);
        registry.join("lobby", bob);

        let delivered =
            broadcast(&registry, "lobby", Event::user_message("alice", "hi"), TIMEOUT).await;

        assert_eq!(delivered, 2);
        assert_eq!(alice_rx.recv().await.unwrap().to_text(), "alice: hi");
        assert_eq!(bob_rx.recv().await.unwrap().to_text(), "alice: hi");
    }

    #[tokio::test]
    async fn test_other_rooms_do_not_receive() {
        let registry = RoomRegistry::new();
        let (alice, mut alice_rx) = ConnectionHandle::new(8);
        let (bob, mut bob_rx) = ConnectionHandle::new(8);
        registry.join("lobby", alice);
        registry.join("rust", bob);

        broadcast(&registry, "lobby", Event::user_message("alice", "hi"), TIMEOUT).await;

        assert_eq!(alice_rx.try_recv().unwrap(), Event::user_message("alice", "hi"));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_room_delivers_nothing() {
        let registry = RoomRegistry::new();

        assert_eq!(
            broadcast(&registry, "nowhere", Event::ClientDisconnected, TIMEOUT).await,
            0
        );
        assert!(!registry.contains_room("nowhere"));
    }

    #[tokio::test]
    async fn test_closed_member_is_skipped() {
        let registry = RoomRegistry::new();
        let (alice, alice_rx) = ConnectionHandle::new(8);
        let (bob, mut bob_rx) = ConnectionHandle::new(8);
        registry.join("lobby", alice);
        registry.join("lobby", bob);
        drop(alice_rx);

        let delivered = broadcast(&registry, "lobby", Event::ClientDisconnected, TIMEOUT).await;

        assert_eq!(delivered, 1);
        assert_eq!(bob_rx.try_recv().unwrap(), Event::ClientDisconnected);
    }

    #[tokio::test]
    async fn test_slow_member_does_not_block_the_room() {
        let registry = RoomRegistry::new();
        let (slow, _slow_rx) = ConnectionHandle::new(1);
        let (bob, mut bob_rx) = ConnectionHandle::new(8);
        registry.join("lobby", slow);
        registry.join("lobby", bob);

        // the first event fills the slow member's queue
        assert_eq!(
            broadcast(&registry, "lobby", Event::user_message("bob", "1"), TIMEOUT).await,
            2
        );
        assert_eq!(
            broadcast(&registry, "lobby", Event::user_message("bob", "2"), TIMEOUT).await,
            1
        );

        assert_eq!(bob_rx.recv().await, Some(Event::user_message("bob", "1")));
        assert_eq!(bob_rx.recv().await, Some(Event::user_message("bob", "2")));
    }
}
