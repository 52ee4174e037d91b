use radius_wire::{
    auth::verify_response_authenticator, Attribute, AttributeType, Code, Packet,
};
use std::net::{Ipv4Addr, UdpSocket};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <username> <password> <secret> [server_addr]", args[0]);
        eprintln!("Example: {} admin admin123 testing123 127.0.0.1:1812", args[0]);
        std::process::exit(1);
    }

    let username = &args[1];
    let password = &args[2];
    let secret = args[3].as_bytes();
    let server_addr = args.get(4).map(|s| s.as_str()).unwrap_or("127.0.0.1:1812");

    println!("RADIUS Client Test");
    println!("==================");
    println!("Server: {}", server_addr);
    println!("Username: {}", username);
    println!();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(server_addr)?;

    let mut request = Packet::request(Code::AccessRequest, 1, secret);
    request.add_attribute(Attribute::string(AttributeType::UserName as u8, username.as_str())?);
    request.set_user_password(password.as_bytes())?;
    request.add_attribute(Attribute::ipv4(
        AttributeType::NasIpAddress as u8,
        Ipv4Addr::LOCALHOST,
    )?);
    request.add_message_authenticator();

    let request_data = request.encode_request()?;
    println!("Sending Access-Request ({} bytes)...", request_data.len());
    socket.send(&request_data)?;

    let mut buffer = vec![0u8; Packet::MAX_PACKET_SIZE];
    socket.set_read_timeout(Some(std::time::Duration::from_secs(5)))?;

    let len = match socket.recv(&mut buffer) {
        Ok(len) => len,
        Err(e) => {
            eprintln!("No response from server: {}", e);
            eprintln!("  Make sure the RADIUS server is running on {}", server_addr);
            return Err(e.into());
        }
    };

    println!("Received response ({} bytes)", len);
    let response = Packet::decode(&buffer[..len], secret)?;

    if response.identifier != request.identifier {
        eprintln!("Identifier mismatch: sent {}, got {}", request.identifier, response.identifier);
    }
    if !verify_response_authenticator(&response, &request.authenticator, secret) {
        eprintln!("Response Authenticator does not verify: wrong secret?");
    }

    match response.code {
        Code::AccessAccept => println!("\nAuthentication SUCCESSFUL (Access-Accept)"),
        Code::AccessReject => println!("\nAuthentication FAILED (Access-Reject)"),
        Code::AccessChallenge => println!("\nAuthentication CHALLENGE (Access-Challenge)"),
        other => println!("\nUnexpected response: {}", other),
    }

    for attr in response.find_all_attributes(AttributeType::ReplyMessage as u8) {
        if let Ok(msg) = attr.as_string() {
            println!("  Message: {}", msg);
        }
    }

    println!("\nResponse Details:");
    println!("  Identifier: {}", response.identifier);
    println!("  Attributes: {}", response.attributes.len());

    Ok(())
}
