use clap::{arg, Command, ValueEnum};
use crds::{APIRule, VirtualService};
use kube::CustomResourceExt;

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Crd {
    #[clap(alias = "apirule", alias = "apiRule")]
    ApiRule,
    #[clap(alias = "virtualservice", alias = "virtualService")]
    VirtualService,
}

fn cli() -> Command {
    Command::new("apigate-crd")
        .about("apigate command line interface for managing CRD's")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("print").about("Print a CRD").arg(
                arg!(<CRD>)
                    .value_parser(clap::value_parser!(Crd))
                    .required(true),
            ),
        )
}

fn main() {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("print", sub_matches)) => {
            let crd = sub_matches.get_one::<Crd>("CRD").unwrap();
            let s = match crd {
                Crd::ApiRule => APIRule::crd(),
                Crd::VirtualService => VirtualService::crd(),
            };
            println!("{}", serde_yml::to_string(&s).unwrap());
        }
        _ => unreachable!(),
    }
}
